use serde::Serialize;
use std::fmt;

/// Authenticated identity attributed to a mutating action.
///
/// Only constructible from a non-blank identity, so every transition that
/// takes an `&Actor` has something to stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    pub fn new(identity: impl AsRef<str>) -> Option<Self> {
        let identity = identity.as_ref().trim();
        if identity.is_empty() {
            None
        } else {
            Some(Self(identity.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
