//! Schema versions (`major.minor.patch`) used by commits and migrations

use crate::errors::DataError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which component a commit advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bump {
    Major,
    Minor,
    Patch,
}

impl FromStr for Bump {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "major" => Ok(Bump::Major),
            "minor" => Ok(Bump::Minor),
            "patch" => Ok(Bump::Patch),
            other => Err(DataError::InvalidVersion(format!("unknown bump '{}'", other))),
        }
    }
}

/// Ordered by major, then minor, then patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Next version. Major resets minor and patch; minor resets patch.
    /// Fails when the bumped component would overflow.
    pub fn bump(self, kind: Bump) -> Result<Self, DataError> {
        let overflow = || DataError::InvalidVersion(format!("{} cannot take a {:?} bump", self, kind));
        Ok(match kind {
            Bump::Major => Self::new(self.major.checked_add(1).ok_or_else(overflow)?, 0, 0),
            Bump::Minor => Self::new(self.major, self.minor.checked_add(1).ok_or_else(overflow)?, 0),
            Bump::Patch => Self::new(
                self.major,
                self.minor,
                self.patch.checked_add(1).ok_or_else(overflow)?,
            ),
        })
    }
}

impl FromStr for SchemaVersion {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let core = trimmed.strip_prefix('v').unwrap_or(trimmed);

        let parts: Vec<&str> = core.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(DataError::InvalidVersion(s.to_string()));
        };

        let component = |part: &&str| {
            part.parse::<u32>()
                .map_err(|_| DataError::InvalidVersion(s.to_string()))
        };
        Ok(Self::new(
            component(major)?,
            component(minor)?,
            component(patch)?,
        ))
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SchemaVersion> for String {
    fn from(version: SchemaVersion) -> Self {
        version.to_string()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
