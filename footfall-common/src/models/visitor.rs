// File: footfall-common/src/models/visitor.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A durable visitor identity. The id is a UUID v4 rendered as text; it is
/// generated once per profile and never rewritten while the stored cookie
/// record remains valid.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct VisitorIdentity {
    pub visitor_id: String,
}

impl VisitorIdentity {
    pub fn new(visitor_id: impl Into<String>) -> Self {
        Self { visitor_id: visitor_id.into() }
    }
}

/// `SameSite` attribute carried on the stored cookie record.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => write!(f, "strict"),
            SameSite::Lax => write!(f, "lax"),
            SameSite::None => write!(f, "none"),
        }
    }
}

impl FromStr for SameSite {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            other => Err(format!("Unknown SameSite value: {}", other)),
        }
    }
}

/// One persisted cookie entry. The jar is keyed by `name`; an entry past its
/// `expires_at` is treated the same as a missing one.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub same_site: SameSite,
}

impl CookieRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}
