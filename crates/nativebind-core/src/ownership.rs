//! Ownership transfer annotations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a native call hands a reference over or merely lends one.
///
/// - `Full`: the receiver now owns a reference and must release it.
/// - `None`: nothing is transferred; the receiver must not release.
/// - `Borrowed`: like `None`, and the value is only valid for the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    Full,
    #[default]
    None,
    Borrowed,
}

impl Ownership {
    /// Whether the holder of a value with this ownership must release it.
    pub const fn transfers_reference(self) -> bool {
        matches!(self, Ownership::Full)
    }

    /// Get the annotation spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Ownership::Full => "full",
            Ownership::None => "none",
            Ownership::Borrowed => "borrowed",
        }
    }

    /// All annotation values.
    pub const ALL: [Ownership; 3] = [Ownership::Full, Ownership::None, Ownership::Borrowed];
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
