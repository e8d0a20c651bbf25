//! Stable, globally resolvable names for targets and models.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Fully-qualified dotted name, e.g. `billing.tasks.send_invoices`.
///
/// Identifiers are what crosses the queue in place of function pointers or
/// types, so they must resolve the same way in every process running the same
/// code. A name with a single segment is rejected as unqualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Parse and validate an identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, JobError> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment (the bare function or type name).
    pub fn short_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

fn validate(name: &str) -> Result<(), JobError> {
    let mut segments = 0usize;
    for segment in name.split('.') {
        if !is_segment(segment) {
            return Err(JobError::invalid_identifier(format!(
                "{name:?}: segment {segment:?} is not a valid name"
            )));
        }
        segments += 1;
    }

    if segments < 2 {
        return Err(JobError::invalid_identifier(format!(
            "{name:?}: expected a qualified name like `module.name`"
        )));
    }

    Ok(())
}

fn is_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

impl core::fmt::Display for Identifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = JobError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
