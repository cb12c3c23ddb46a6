//! The three ways a pending row-set combines with a key's latest version.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Mutation mode requested by a writer.
///
/// Recorded on every commit as `"operation"` and accepted in configuration
/// strings as `write_style`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Replace the whole content of the key.
    #[default]
    Write,
    /// Add rows strictly after the latest version's last timestamp.
    Append,
    /// Replace a sub-range contained in the latest version's span.
    Update,
}

impl WriteMode {
    /// Lowercase name as used in commits and configuration strings.
    pub fn as_str(self) -> &'static str {
        match self {
            WriteMode::Write => "write",
            WriteMode::Append => "append",
            WriteMode::Update => "update",
        }
    }

    /// Whether this mode validates against an existing version.
    pub fn requires_existing(self) -> bool {
        !matches!(self, WriteMode::Write)
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "write" => Ok(WriteMode::Write),
            "append" => Ok(WriteMode::Append),
            "update" => Ok(WriteMode::Update),
            other => Err(format!(
                "unknown write mode {other:?} (expected write, append or update)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("APPEND".parse::<WriteMode>(), Ok(WriteMode::Append));
        assert_eq!(" update ".parse::<WriteMode>(), Ok(WriteMode::Update));
        assert!("upsert".parse::<WriteMode>().is_err());
    }

    #[test]
    fn only_write_creates_keys() {
        assert!(!WriteMode::Write.requires_existing());
        assert!(WriteMode::Append.requires_existing());
        assert!(WriteMode::Update.requires_existing());
    }
}
