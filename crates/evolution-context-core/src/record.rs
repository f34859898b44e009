use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Identifier of a reflection as issued by the reflection store.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(untagged)]
pub enum ReflectionId {
    Number(i64),
    Text(String),
}

impl Display for ReflectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for ReflectionId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ReflectionId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ReflectionId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One entry of a user's reflection history.
///
/// Only `id` and `created_at` are interpreted. `payload` is carried through
/// selection untouched; with a JSON object payload its fields serialize
/// alongside `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReflectionRecord<T> {
    pub id: ReflectionId,
    #[serde(alias = "createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> ReflectionRecord<T> {
    #[must_use]
    pub fn new(id: impl Into<ReflectionId>, created_at: OffsetDateTime, payload: T) -> Self {
        Self { id: id.into(), created_at, payload }
    }
}
