//! Outgoing actions and their wire encoding

use std::fmt;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    constants::{FIELD_SEPARATOR, LINE_TERMINATOR, VARIABLE_SEPARATOR},
    error::{AmiError, AmiResult},
    headers::AmiHeader,
};

/// AMI lines are CRLF-delimited; a CR or LF inside a key or value would let a
/// caller inject extra fields or a whole second action.
fn validate_no_newlines(s: &str, context: &str) -> AmiResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(AmiError::invalid_action(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// Value of one action field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionValue {
    Single(String),
    /// Serialized as one `key: element` line per element.
    List(Vec<String>),
}

impl From<&str> for ActionValue {
    fn from(s: &str) -> Self {
        Self::Single(s.to_string())
    }
}

impl From<String> for ActionValue {
    fn from(s: String) -> Self {
        Self::Single(s)
    }
}

impl From<Vec<String>> for ActionValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

/// An outgoing AMI action.
///
/// Always carries an `Action` field. An `ActionID` is generated when the action
/// is sent without one.
///
/// ```
/// use asterisk_ami_tokio::AmiAction;
///
/// let action = AmiAction::new("Originate")
///     .with_action_id("42")
///     .set("Channel", "Local/s@callback/n")
///     .variable("CALL_SRC", "79000000000")
///     .variable("CALL_DST", "78000000000");
/// assert_eq!(
///     action.to_wire_format().unwrap(),
///     "Action: Originate\r\nActionID: 42\r\nChannel: Local/s@callback/n\r\n\
///      Variable: CALL_SRC=79000000000\r\nVariable: CALL_DST=78000000000\r\n\r\n"
/// );
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct AmiAction {
    fields: IndexMap<String, ActionValue>,
}

impl AmiAction {
    /// Start an action with the given verb (`login`, `Status`, `Originate`, ...).
    pub fn new(action: impl Into<String>) -> Self {
        let mut fields = IndexMap::new();
        fields.insert(
            AmiHeader::Action
                .as_str()
                .to_string(),
            ActionValue::Single(action.into()),
        );
        Self { fields }
    }

    /// The `login` action the adapter sends right after the TCP connect.
    pub fn login(username: &str, secret: &str, events: bool) -> Self {
        Self::new("login")
            .set(AmiHeader::Username, username)
            .set(AmiHeader::Secret, secret)
            .set(AmiHeader::Events, if events { "on" } else { "off" })
    }

    /// The `Logoff` action written by a graceful disconnect.
    pub fn logoff() -> Self {
        Self::new("Logoff")
    }

    /// Set a field, replacing any previous value under the same key.
    pub fn set(mut self, key: impl AsRef<str>, value: impl Into<ActionValue>) -> Self {
        self.fields
            .insert(key.as_ref().to_string(), value.into());
        self
    }

    /// Append one element to a list field, converting a scalar into a list.
    pub fn push(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        let key = key.as_ref();
        let value = value.into();
        match self
            .fields
            .get_mut(key)
        {
            Some(ActionValue::List(items)) => items.push(value),
            Some(slot) => {
                let prev = std::mem::replace(slot, ActionValue::List(Vec::new()));
                if let ActionValue::Single(prev) = prev {
                    *slot = ActionValue::List(vec![prev, value]);
                }
            }
            None => {
                self.fields
                    .insert(key.to_string(), ActionValue::List(vec![value]));
            }
        }
        self
    }

    /// Append a `Variable: name=value` line.
    pub fn variable(self, name: &str, value: &str) -> Self {
        self.push(
            AmiHeader::Variable,
            format!("{}{}{}", name, VARIABLE_SEPARATOR, value),
        )
    }

    pub fn with_action_id(self, action_id: impl Into<String>) -> Self {
        self.set(AmiHeader::ActionId, action_id.into())
    }

    /// The action verb.
    pub fn action(&self) -> &str {
        match self
            .fields
            .get(AmiHeader::Action.as_str())
        {
            Some(ActionValue::Single(s)) => s,
            _ => "",
        }
    }

    pub fn action_id(&self) -> Option<&str> {
        match self
            .fields
            .get(AmiHeader::ActionId.as_str())
        {
            Some(ActionValue::Single(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, key: impl AsRef<str>) -> Option<&ActionValue> {
        self.fields
            .get(key.as_ref())
    }

    pub fn fields(&self) -> &IndexMap<String, ActionValue> {
        &self.fields
    }

    /// Return the ActionID, generating a UUID v4 if the action has none.
    pub(crate) fn ensure_action_id(&mut self) -> String {
        if let Some(id) = self.action_id() {
            return id.to_string();
        }
        let id = Uuid::new_v4().to_string();
        self.fields.insert(
            AmiHeader::ActionId
                .as_str()
                .to_string(),
            ActionValue::Single(id.clone()),
        );
        id
    }

    /// Encode to wire text: `Key: Value` lines in insertion order, one line per
    /// list element, followed by a blank line.
    pub fn to_wire_format(&self) -> AmiResult<String> {
        use std::fmt::Write;

        let mut out = String::new();
        for (key, value) in &self.fields {
            validate_no_newlines(key, "field name")?;
            match value {
                ActionValue::Single(v) => {
                    validate_no_newlines(v, "field value")?;
                    let _ = write!(out, "{}{}{}{}", key, FIELD_SEPARATOR, v, LINE_TERMINATOR);
                }
                ActionValue::List(items) => {
                    for v in items {
                        validate_no_newlines(v, "field value")?;
                        let _ = write!(out, "{}{}{}{}", key, FIELD_SEPARATOR, v, LINE_TERMINATOR);
                    }
                }
            }
        }
        out.push_str(LINE_TERMINATOR);
        Ok(out)
    }

    /// Wire text with the `Secret` value masked, for logging.
    pub(crate) fn redacted(&self) -> String {
        let mut copy = self.clone();
        if copy
            .fields
            .contains_key(AmiHeader::Secret.as_str())
        {
            copy = copy.set(AmiHeader::Secret, "[REDACTED]");
        }
        copy.to_wire_format()
            .unwrap_or_else(|e| e.to_string())
    }
}

impl fmt::Debug for AmiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.fields {
            if key == AmiHeader::Secret.as_str() {
                map.entry(key, &"[REDACTED]");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}
