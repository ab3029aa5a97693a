//! SKU code derivation
//!
//! A SKU is `{CATEGORY}-{VARIANT}-{NNNN}`, where the two prefix parts are
//! derived from the product's category and variant and the sequence comes
//! from a persistent per-prefix counter.

use serde::{Deserialize, Serialize};

/// Maximum characters kept from the category
pub const CATEGORY_PREFIX_LEN: usize = 4;
/// Maximum characters kept from the variant
pub const VARIANT_PREFIX_LEN: usize = 2;

/// Normalized prefix pair for SKU generation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkuPrefix {
    pub category: String,
    pub variant: String,
}

impl SkuPrefix {
    pub fn new(category: &str, variant: &str) -> Self {
        Self {
            category: normalize_part(category, CATEGORY_PREFIX_LEN, "GEN"),
            variant: normalize_part(variant, VARIANT_PREFIX_LEN, "NA"),
        }
    }

    /// Key of the counter row that backs this prefix (e.g., "SKU_ELEC_BL")
    pub fn counter_id(&self) -> String {
        format!("SKU_{}_{}", self.category, self.variant)
    }

    /// Render a SKU for the given sequence number
    pub fn format(&self, sequence: i64) -> String {
        format!("{}-{}-{:04}", self.category, self.variant, sequence)
    }
}

fn normalize_part(raw: &str, max_len: usize, fallback: &str) -> String {
    let part: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .take(max_len)
        .collect();

    if part.is_empty() {
        fallback.to_string()
    } else {
        part
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_truncates_and_uppercases() {
        let prefix = SkuPrefix::new("Electronics", "blue");
        assert_eq!(prefix.category, "ELEC");
        assert_eq!(prefix.variant, "BL");
    }

    #[test]
    fn test_prefix_strips_non_alphanumeric() {
        let prefix = SkuPrefix::new("a-b c!d/e", "x y");
        assert_eq!(prefix.category, "ABCD");
        assert_eq!(prefix.variant, "XY");
    }

    #[test]
    fn test_prefix_defaults_when_empty() {
        let prefix = SkuPrefix::new("", "--");
        assert_eq!(prefix.category, "GEN");
        assert_eq!(prefix.variant, "NA");
    }

    #[test]
    fn test_format_pads_sequence() {
        let prefix = SkuPrefix::new("Tools", "");
        assert_eq!(prefix.format(7), "TOOL-NA-0007");
        assert_eq!(prefix.format(12345), "TOOL-NA-12345");
        assert_eq!(prefix.counter_id(), "SKU_TOOL_NA");
    }
}
