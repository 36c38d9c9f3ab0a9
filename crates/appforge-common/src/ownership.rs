use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParseError;

/// An agent's write privilege on one artifact type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnershipLevel {
    /// May create and overwrite the artifact.
    Owner,
    /// May create the artifact, but never overwrite existing work.
    ProposeOnly,
    /// May only read the artifact.
    #[default]
    ReadOnly,
}

impl OwnershipLevel {
    pub fn is_owner(&self) -> bool {
        matches!(self, Self::Owner)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::ProposeOnly => "propose-only",
            Self::ReadOnly => "read-only",
        }
    }
}

impl fmt::Display for OwnershipLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnershipLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "owner" => Ok(Self::Owner),
            "propose-only" => Ok(Self::ProposeOnly),
            "read-only" => Ok(Self::ReadOnly),
            _ => Err(ParseError::new("ownership level", s)),
        }
    }
}
