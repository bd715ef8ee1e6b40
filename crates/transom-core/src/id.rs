use serde::{Deserialize, Serialize};
use std::fmt;

pub fn new_uid() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn new_short_uid() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new() -> Self {
        Self(new_uid())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for InstanceId {
    fn from(uid: String) -> Self {
        Self(uid)
    }
}

impl From<&str> for InstanceId {
    fn from(uid: &str) -> Self {
        Self(uid.to_string())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
