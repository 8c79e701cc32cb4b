//! Recipient and occupancy lookup.
//!
//! The routing engine only ever talks to a [`RecipientDirectory`]. The
//! [`StaticDirectory`] implementation is built from the `recipients`
//! configuration section and keeps presence in memory.

mod static_directory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use static_directory::{RecipientConfig, RecipientDeliveryConfig, StaticDirectory};

use crate::Result;
use crate::target::Target;

/// Which recipients a delivery addresses, based on who is home.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyFilter {
    /// Every recipient.
    #[default]
    All,
    /// Every recipient, if anyone is home.
    AnyIn,
    /// Every recipient, if anyone is away.
    AnyOut,
    /// Only recipients who are home.
    OnlyIn,
    /// Only recipients who are away.
    OnlyOut,
    /// Nobody.
    None,
}

impl OccupancyFilter {
    /// Apply the filter to a recipient list.
    ///
    /// Recipients with unknown presence count as away.
    pub fn apply(&self, recipients: &[Recipient]) -> Vec<Recipient> {
        let any_home = recipients.iter().any(Recipient::is_home);
        let any_away = recipients.iter().any(|r| !r.is_home());
        match self {
            Self::All => recipients.to_vec(),
            Self::AnyIn if any_home => recipients.to_vec(),
            Self::AnyOut if any_away => recipients.to_vec(),
            Self::OnlyIn => recipients.iter().filter(|r| r.is_home()).cloned().collect(),
            Self::OnlyOut => recipients.iter().filter(|r| !r.is_home()).cloned().collect(),
            Self::AnyIn | Self::AnyOut | Self::None => Vec::new(),
        }
    }
}

/// A person that notifications can be addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub person_id: String,
    /// Presence, when known.
    pub home: Option<bool>,
}

impl Recipient {
    pub fn new(person_id: impl Into<String>, home: Option<bool>) -> Self {
        Self {
            person_id: person_id.into(),
            home,
        }
    }

    pub fn is_home(&self) -> bool {
        self.home == Some(true)
    }
}

/// Source of recipients, their presence and their addresses.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Every known recipient, presence included.
    async fn recipients(&self) -> Result<Vec<Recipient>>;

    /// Recipients a delivery with the given occupancy filter addresses.
    async fn occupancy_eligible(&self, filter: OccupancyFilter) -> Result<Vec<Recipient>> {
        Ok(filter.apply(&self.recipients().await?))
    }

    /// A person's addresses for one delivery.
    ///
    /// The flag tells whether the person carries their own payload, in which
    /// case the returned target is target-specific.
    async fn resolve_addresses(&self, person_id: &str, delivery: &str) -> Result<(Target, bool)>;

    /// Names of deliveries the person has explicitly switched on.
    async fn enabling_delivery_names(&self, person_id: &str) -> Result<Vec<String>>;
}
