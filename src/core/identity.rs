//! Record identity system using type-prefixed ULIDs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// Record type prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityPrefix {
    /// Engineering change request
    Ecr,
    /// Engineering change notice
    Ecn,
    /// Approver assignment on a change order
    Apr,
    /// Audit trail entry
    Aud,
    /// Implementation (revision release) record
    Rev,
}

impl EntityPrefix {
    /// Get the string representation of the prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::Ecr => "ECR",
            EntityPrefix::Ecn => "ECN",
            EntityPrefix::Apr => "APR",
            EntityPrefix::Aud => "AUD",
            EntityPrefix::Rev => "REV",
        }
    }

    /// Get all valid prefixes
    pub fn all() -> &'static [EntityPrefix] {
        &[
            EntityPrefix::Ecr,
            EntityPrefix::Ecn,
            EntityPrefix::Apr,
            EntityPrefix::Aud,
            EntityPrefix::Rev,
        ]
    }

    /// Whether ids with this prefix name a change order
    pub fn is_change_order(&self) -> bool {
        matches!(self, EntityPrefix::Ecr | EntityPrefix::Ecn)
    }
}

impl fmt::Display for EntityPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityPrefix {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ECR" => Ok(EntityPrefix::Ecr),
            "ECN" => Ok(EntityPrefix::Ecn),
            "APR" => Ok(EntityPrefix::Apr),
            "AUD" => Ok(EntityPrefix::Aud),
            "REV" => Ok(EntityPrefix::Rev),
            _ => Err(IdParseError::InvalidPrefix(s.to_string())),
        }
    }
}

/// A unique record identifier combining a type prefix and ULID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    prefix: EntityPrefix,
    ulid: Ulid,
}

impl PartialOrd for EntityPrefix {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityPrefix {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl EntityId {
    /// Create a new EntityId with the given prefix
    pub fn new(prefix: EntityPrefix) -> Self {
        Self {
            prefix,
            ulid: Ulid::new(),
        }
    }

    /// Create an EntityId from a prefix and existing ULID
    pub fn from_parts(prefix: EntityPrefix, ulid: Ulid) -> Self {
        Self { prefix, ulid }
    }

    /// Get the record prefix
    pub fn prefix(&self) -> EntityPrefix {
        self.prefix
    }

    /// Get the ULID component
    pub fn ulid(&self) -> Ulid {
        self.ulid
    }

    /// Parse an EntityId from a string
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        s.parse()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.ulid)
    }
}

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix_str, ulid_str) = s
            .split_once('-')
            .ok_or_else(|| IdParseError::MissingDelimiter(s.to_string()))?;

        let prefix = prefix_str.parse()?;
        let ulid = Ulid::from_string(ulid_str)
            .map_err(|e| IdParseError::InvalidUlid(ulid_str.to_string(), e.to_string()))?;

        Ok(Self { prefix, ulid })
    }
}

impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing record IDs
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("invalid record prefix: '{0}' (valid: ECR, ECN, APR, AUD, REV)")]
    InvalidPrefix(String),

    #[error("missing '-' delimiter in record ID: '{0}'")]
    MissingDelimiter(String),

    #[error("invalid ULID '{0}': {1}")]
    InvalidUlid(String, String),
}
