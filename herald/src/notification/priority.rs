//! Notification priority levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Priority level for notifications, ordered by urgency.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Barely worth mentioning.
    Minimum,
    /// Low priority - informational only.
    Low,
    /// Medium priority - standard notifications.
    #[default]
    Medium,
    /// High priority - important events.
    High,
    /// Critical priority - requires immediate attention.
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Self::Minimum,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::Critical,
    ];

    /// The most urgent level.
    pub const TOP: Priority = Priority::Critical;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimum => "minimum",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// This level and every more urgent one.
    pub fn at_or_above(self) -> Vec<Priority> {
        Self::ALL.into_iter().filter(|p| *p >= self).collect()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| crate::Error::validation(format!("Unknown priority: {s}")))
    }
}
