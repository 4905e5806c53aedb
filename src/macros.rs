/// Generates a non-exhaustive enum whose variants map to fixed protocol strings.
///
/// Produces: enum definition + `ALL` + `as_str()` + `Display` + `AsRef<str>` +
/// case-insensitive `FromStr`. The parse error type is a tuple struct holding the
/// rejected input and must be declared next to the invocation.
///
/// ```ignore
/// define_wire_enum! {
///     error_type: ParseThingError,
///     /// Doc comment for the enum.
///     pub enum Thing {
///         Login => "login",
///         Logoff => "Logoff",
///     }
/// }
/// ```
macro_rules! define_wire_enum {
    (
        error_type: $Err:ident,
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        $vis enum $Name {
            $(
                $(#[$var_meta])*
                $variant,
            )+
        }

        impl $Name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$Name] = &[$( $Name::$variant, )+];

            /// Protocol string for this variant.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $Name::$variant => $wire, )+
                }
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $Name::ALL
                    .iter()
                    .copied()
                    .find(|v| s.eq_ignore_ascii_case(v.as_str()))
                    .ok_or_else(|| $Err(s.to_string()))
            }
        }
    };
}
