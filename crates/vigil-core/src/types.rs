use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cost/capability class of a model backend, cheapest first.
///
/// The derived ordering is the escalation order: `Local < Cheap < Mid < Premium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Local,
    Cheap,
    Mid,
    Premium,
}

impl ModelTier {
    /// All tiers in escalation order.
    pub const ALL: [ModelTier; 4] = [Self::Local, Self::Cheap, Self::Mid, Self::Premium];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cheap => "cheap",
            Self::Mid => "mid",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelTier {
    type Err = crate::VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "cheap" => Ok(Self::Cheap),
            "mid" => Ok(Self::Mid),
            "premium" => Ok(Self::Premium),
            other => Err(crate::VigilError::Config(format!("unknown model tier '{other}'"))),
        }
    }
}
