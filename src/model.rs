//! Shared record shapes: the raw per-storefront tuple and the canonical game record.
use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Storefront that produced a record. The discriminants are the persisted `website_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Steam = 1,
    Gog = 2,
    Epic = 3,
}

impl SourceId {
    pub const ALL: [SourceId; 3] = [SourceId::Steam, SourceId::Gog, SourceId::Epic];

    pub fn id(self) -> i16 {
        self as i16
    }

    pub fn name(self) -> &'static str {
        match self {
            SourceId::Steam => "steam",
            SourceId::Gog => "gog",
            SourceId::Epic => "epic",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceIdError {
    #[error("unknown storefront id {0}; expected 1 (steam), 2 (gog) or 3 (epic)")]
    UnknownId(i64),
}

impl TryFrom<i64> for SourceId {
    type Error = SourceIdError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SourceId::Steam),
            2 => Ok(SourceId::Gog),
            3 => Ok(SourceId::Epic),
            other => Err(SourceIdError::UnknownId(other)),
        }
    }
}

/// Platform a game runs on. The discriminants are the seeded `platform` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PlatformId {
    Windows = 1,
    MacOs = 2,
    Linux = 3,
}

impl PlatformId {
    pub fn id(self) -> i16 {
        self as i16
    }

    pub fn name(self) -> &'static str {
        match self {
            PlatformId::Windows => "Windows",
            PlatformId::MacOs => "macOS",
            PlatformId::Linux => "Linux",
        }
    }
}

/// Non-negative price held in minor units so that `0.00` is exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price {
    minor: i64,
}

impl Price {
    pub const ZERO: Price = Price { minor: 0 };

    /// Negative amounts are not prices; they collapse to zero.
    pub fn from_minor(minor: i64) -> Self {
        Self {
            minor: minor.max(0),
        }
    }

    pub fn from_major(major: f64) -> Self {
        if !major.is_finite() || major <= 0.0 {
            return Self::ZERO;
        }
        Self::from_minor((major * 100.0).round() as i64)
    }

    pub fn minor(self) -> i64 {
        self.minor
    }

    pub fn as_f64(self) -> f64 {
        self.minor as f64 / 100.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.minor / 100, self.minor % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

/// Price exactly as a storefront reports it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawPrice {
    /// Major currency units, already parsed best-effort (malformed input is 0).
    Major(f64),
    /// Minor currency units (price x 100).
    Minor(i64),
}

impl RawPrice {
    pub const FREE: RawPrice = RawPrice::Minor(0);
}

/// Rating exactly as a storefront reports it, before rescaling to a percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawRating {
    Absent,
    /// 0-5 star average.
    Stars(f64),
    /// Review vote counts; `None` means the storefront showed no count for that side.
    Votes {
        positive: Option<u64>,
        negative: Option<u64>,
    },
}

/// Flat per-game tuple produced by a source adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RawGame {
    pub source: SourceId,
    pub title: String,
    pub description: String,
    pub price: RawPrice,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub release_date: NaiveDateTime,
    pub rating: RawRating,
    pub tags: Vec<String>,
    /// Free-text platform labels from a dedicated platform field.
    pub platforms: Vec<String>,
}

/// Canonical, source-independent game record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameRecord {
    pub title: String,
    pub description: String,
    pub price: Price,
    pub developer_name: Option<String>,
    pub publisher_name: Option<String>,
    pub release_date: NaiveDateTime,
    /// Percentage in [0, 100].
    pub rating: Option<f64>,
    pub source_id: SourceId,
    pub tags: Vec<String>,
    pub platform_ids: BTreeSet<PlatformId>,
}
