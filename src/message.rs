//! Decoded AMI messages

use indexmap::IndexMap;
use serde::Serialize;

use crate::{constants::RESPONSE_SUCCESS, headers::AmiHeader};

/// One decoded AMI frame: a response or an unsolicited event.
///
/// Fields keep their arrival order; a repeated field name overwrites the earlier
/// value. `Variable` lines are collected into a separate `name → value` map.
/// Serializes to a flat JSON object with `Variable` as a nested object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AmiMessage {
    #[serde(flatten)]
    fields: IndexMap<String, String>,
    #[serde(rename = "Variable", skip_serializing_if = "Option::is_none")]
    variables: Option<IndexMap<String, String>>,
}

impl AmiMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field value by name (exact match).
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.fields
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    /// All scalar fields in arrival order.
    pub fn fields(&self) -> &IndexMap<String, String> {
        &self.fields
    }

    /// Set or overwrite a field. The overwritten field keeps its position.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields
            .insert(name.into(), value.into());
    }

    /// The `Variable` map, present once any `Variable` line was seen.
    pub fn variables(&self) -> Option<&IndexMap<String, String>> {
        self.variables
            .as_ref()
    }

    /// One channel variable by name.
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables
            .as_ref()?
            .get(name)
            .map(|s| s.as_str())
    }

    /// Make sure the `Variable` map exists, returning it.
    pub(crate) fn variables_mut(&mut self) -> &mut IndexMap<String, String> {
        self.variables
            .get_or_insert_with(IndexMap::new)
    }

    pub fn insert_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables_mut()
            .insert(name.into(), value.into());
    }

    pub fn action_id(&self) -> Option<&str> {
        self.get(AmiHeader::ActionId)
    }

    pub fn response(&self) -> Option<&str> {
        self.get(AmiHeader::Response)
    }

    pub fn message(&self) -> Option<&str> {
        self.get(AmiHeader::Message)
    }

    /// Event name for unsolicited events.
    pub fn event(&self) -> Option<&str> {
        self.get(AmiHeader::Event)
    }

    /// `Response: Success`. Comparison is exact, as Asterisk sends it.
    pub fn is_success(&self) -> bool {
        self.response() == Some(RESPONSE_SUCCESS)
    }

    /// True when the frame carried no usable line.
    pub fn is_empty(&self) -> bool {
        self.fields
            .is_empty()
            && self
                .variables
                .is_none()
    }

    /// Compact JSON rendering used for log output.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}
