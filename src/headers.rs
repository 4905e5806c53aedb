//! Typed names for the AMI fields the adapter itself reads or writes.

/// Error returned when parsing a field name outside [`AmiHeader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAmiHeaderError(pub String);

impl std::fmt::Display for ParseAmiHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown AMI header: {}", self.0)
    }
}

impl std::error::Error for ParseAmiHeaderError {}

define_wire_enum! {
    error_type: ParseAmiHeaderError,
    /// Reserved AMI field names.
    ///
    /// Any other field passes through untouched. Usable wherever a field name is
    /// accepted, e.g. [`AmiMessage::get`](crate::AmiMessage::get).
    pub enum AmiHeader {
        /// Verb of an outgoing action.
        Action => "Action",
        /// Correlation token echoed back in the response.
        ActionId => "ActionID",
        /// `Success`, `Error`, `Follows`, ...
        Response => "Response",
        /// Human readable outcome text.
        Message => "Message",
        /// Name of an unsolicited event.
        Event => "Event",
        /// Repeated `name=value` channel variables.
        Variable => "Variable",
        Username => "Username",
        Secret => "Secret",
        /// Login flag: `on` or `off`.
        Events => "Events",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_wire_name() {
        assert_eq!(AmiHeader::ActionId.to_string(), "ActionID");
        assert_eq!(AmiHeader::Variable.to_string(), "Variable");
        let s: &str = AmiHeader::Response.as_ref();
        assert_eq!(s, "Response");
    }

    #[test]
    fn from_str_case_insensitive() {
        assert_eq!("actionid".parse::<AmiHeader>(), Ok(AmiHeader::ActionId));
        assert_eq!("ACTIONID".parse::<AmiHeader>(), Ok(AmiHeader::ActionId));
        assert_eq!("Events".parse::<AmiHeader>(), Ok(AmiHeader::Events));
        assert_eq!("event".parse::<AmiHeader>(), Ok(AmiHeader::Event));
    }

    #[test]
    fn from_str_unknown() {
        let err = "Channel"
            .parse::<AmiHeader>()
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown AMI header: Channel");
    }

    #[test]
    fn all_variants_round_trip() {
        for h in AmiHeader::ALL {
            let parsed: AmiHeader = h
                .as_str()
                .parse()
                .unwrap();
            assert_eq!(parsed, *h);
        }
    }
}
