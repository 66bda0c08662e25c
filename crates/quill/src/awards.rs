//! Static award catalog.
//!
//! Awards are read-only descriptors loaded once at startup; whether one is
//! unlocked is always computed from aggregate counts over the record store
//! ([`crate::app::App::has_earned`]), never stored. A missing or malformed
//! catalog is a fatal startup error - there is no partial catalog.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use tracing::warn;

/// The award definitions compiled into the crate.
const BUNDLED_CATALOG: &str = include_str!("../assets/awards.json");

/// The aggregate count an award's threshold is compared against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    /// Total number of issues.
    Issues,

    /// Number of closed issues.
    Closed,

    /// Total number of tags.
    Tags,

    /// A criterion string this version doesn't understand.
    ///
    /// Decoding succeeds so one odd entry can't take down the whole
    /// catalog; evaluation treats the award as permanently locked and
    /// flags the entry as a catalog-integrity problem.
    Unknown(String),
}

impl Criterion {
    /// The criterion's catalog string.
    pub fn as_str(&self) -> &str {
        match self {
            Criterion::Issues => "issues",
            Criterion::Closed => "closed",
            Criterion::Tags => "tags",
            Criterion::Unknown(other) => other,
        }
    }
}

impl<'de> Deserialize<'de> for Criterion {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(match value.as_str() {
            "issues" => Criterion::Issues,
            "closed" => Criterion::Closed,
            "tags" => Criterion::Tags,
            _ => Criterion::Unknown(value),
        })
    }
}

/// A static achievement descriptor with a computed unlock criterion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Award {
    /// Display name; doubles as the award's identifier.
    pub name: String,

    /// Description shown when the award is inspected.
    pub description: String,

    /// Color token for presentation layers.
    pub color: String,

    /// Which aggregate count unlocks this award.
    pub criterion: Criterion,

    /// Threshold the count must reach (inclusive).
    pub value: usize,

    /// Icon token for presentation layers.
    pub image: String,
}

impl Award {
    /// Stable identifier (the name).
    pub fn id(&self) -> &str {
        &self.name
    }
}

/// The full set of award definitions for this process.
#[derive(Debug, Clone)]
pub struct AwardCatalog {
    awards: Vec<Award>,
}

impl AwardCatalog {
    /// Decode a catalog from JSON.
    ///
    /// Entries with unknown criteria are kept (they evaluate as locked)
    /// but logged as catalog-integrity warnings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Catalog` if the JSON is malformed or the catalog is
    /// empty; startup must fail rather than run with a partial catalog.
    pub fn from_json(json: &str) -> Result<Self> {
        let awards: Vec<Award> = serde_json::from_str(json)
            .map_err(|e| Error::Catalog(format!("failed to decode award catalog: {}", e)))?;

        if awards.is_empty() {
            return Err(Error::Catalog("award catalog is empty".to_string()));
        }

        for award in &awards {
            if let Criterion::Unknown(criterion) = &award.criterion {
                warn!(
                    award = %award.name,
                    %criterion,
                    "award has unknown criterion and will never unlock"
                );
            }
        }

        Ok(Self { awards })
    }

    /// The catalog bundled into the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_CATALOG)
    }

    /// Load a catalog from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    /// All awards, in catalog order.
    pub fn awards(&self) -> &[Award] {
        &self.awards
    }

    /// Look up an award by name.
    pub fn get(&self, name: &str) -> Option<&Award> {
        self.awards.iter().find(|award| award.name == name)
    }

    /// Number of awards in the catalog.
    pub fn len(&self) -> usize {
        self.awards.len()
    }

    /// Whether the catalog is empty (never true for a loaded catalog).
    pub fn is_empty(&self) -> bool {
        self.awards.is_empty()
    }
}
