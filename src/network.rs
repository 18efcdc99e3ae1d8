//! Networks a node can join.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Network selector passed to the node as `-n <network>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Mastery,
    Conquest,
    Avmtestnet,
    Custom,
}

impl Network {
    /// All known networks.
    pub const ALL: [Self; 5] = [
        Self::Mainnet,
        Self::Mastery,
        Self::Conquest,
        Self::Avmtestnet,
        Self::Custom,
    ];

    /// The name understood by the node's network flag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Mastery => "mastery",
            Self::Conquest => "conquest",
            Self::Avmtestnet => "avmtestnet",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|n| n.as_str() == wanted)
            .ok_or_else(|| ValidationError::InvalidField {
                field: "network".to_string(),
                reason: format!("unknown network '{s}'"),
            })
    }
}
