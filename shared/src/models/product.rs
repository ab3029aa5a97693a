//! Product catalog models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sellable item in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    /// Human-readable unique code (e.g., "ELEC-BL-0007")
    pub sku: String,
    pub category: String,
    pub variant: String,
    pub unit: Unit,
    /// Reorder threshold
    pub min_stock: i64,
    /// Normalized (name, variant, category, unit) identity
    pub unique_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Unit of measure
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Unit {
    #[default]
    Nos,
    Pcs,
    Unit,
    Set,
    Pair,
    Box,
}

impl Unit {
    pub const ALL: [Unit; 6] = [Unit::Nos, Unit::Pcs, Unit::Unit, Unit::Set, Unit::Pair, Unit::Box];

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Nos => "Nos",
            Unit::Pcs => "Pcs",
            Unit::Unit => "Unit",
            Unit::Set => "Set",
            Unit::Pair => "Pair",
            Unit::Box => "Box",
        }
    }

    /// Case-insensitive lookup; `"pcs"` and `"PCS"` both resolve to [`Unit::Pcs`].
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|unit| unit.as_str().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the duplicate-detection key shared by the catalog and bulk import.
///
/// Each part is trimmed and lowercased, then joined with `|` in the order
/// name, variant, category, unit.
pub fn unique_key(name: &str, variant: &str, category: &str, unit: Unit) -> String {
    [name, variant, category, unit.as_str()]
        .iter()
        .map(|part| part.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join("|")
}
