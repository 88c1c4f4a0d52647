//! Vendor-name normalization.

use serde::{Deserialize, Serialize};

/// Suffix abbreviations applied after case/whitespace normalization.
/// Longest forms first so e.g. CORPORATION never partially matches.
const SUFFIXES: &[(&str, &str)] = &[
    ("INCORPORATED", "INC"),
    ("CORPORATION", "CORP"),
    ("LIMITED", "LTD"),
    ("COMPANY", "CO"),
];

/// A normalized vendor name and the rules that produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizedVendor {
    pub original: String,
    pub normalized: String,
    pub rules_applied: Vec<String>,
}

/// Normalize a vendor name: uppercase, collapse whitespace, strip
/// characters outside word/space/hyphen, then abbreviate company
/// suffixes.
pub fn normalize_vendor_name(name: &str) -> NormalizedVendor {
    let upper = name.to_uppercase();
    let collapsed = upper.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped: String = collapsed
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | ' ' | '-'))
        .collect();

    let mut normalized = stripped;
    for (full, abbr) in SUFFIXES {
        normalized = normalized.replace(full, abbr);
    }

    NormalizedVendor {
        original: name.to_string(),
        normalized,
        rules_applied: vec![
            "uppercase".to_string(),
            "trim_spaces".to_string(),
            "suffix_normalization".to_string(),
        ],
    }
}
