use serde::{Deserialize, Serialize};

/// Store-assigned row identity
pub type Id = i64;

/// Business-visible order code (`orderNo`, `mainOrder`, `parentOrder`)
pub type OrderNo = String;

/// Whether a main order has been decomposed into sub-orders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitState {
    #[default]
    Unsplit,
    Split,
}

impl SplitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitState::Unsplit => "unsplit",
            SplitState::Split => "split",
        }
    }

    /// Parse the stored column value. Unknown values read as `Unsplit`.
    pub fn from_db(value: &str) -> Self {
        match value {
            "split" => SplitState::Split,
            _ => SplitState::Unsplit,
        }
    }
}

/// Treat empty and whitespace-only strings as absent
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
