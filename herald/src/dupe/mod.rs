//! Time-windowed duplicate-content suppression.
//!
//! The checker remembers `(content hash, priority)` pairs for a limited time.
//! A candidate is a duplicate when the same content was seen within the
//! window at an equal or more urgent priority. Every check records the
//! candidate, whatever the verdict, so a steady stream of repeats keeps
//! itself suppressed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::notification::Priority;

/// Default time a sighting is remembered (2 minutes).
const DEFAULT_TTL_SECS: u64 = 120;

/// Default maximum number of remembered sightings.
const DEFAULT_MAX_ENTRIES: usize = 100;

/// Something that can be checked for duplication.
pub trait DupeCandidate {
    /// Hash of the content that makes two candidates "the same".
    fn content_hash(&self) -> String;

    /// Identifier recorded as the origin of a sighting.
    fn id(&self) -> &str;

    fn priority(&self) -> Priority;

    /// Priorities whose earlier sighting makes this candidate a duplicate.
    fn skip_priorities(&self) -> Vec<Priority> {
        self.priority().at_or_above()
    }
}

/// Duplicate detection policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DupePolicy {
    /// Never report duplicates.
    None,
    /// Compare on message, title and addressing.
    #[default]
    MessageTitle,
}

/// Configuration for the duplicate checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DupeConfig {
    pub policy: DupePolicy,
    /// Seconds a sighting is remembered.
    pub ttl_secs: u64,
    /// Maximum number of remembered sightings.
    pub max_entries: usize,
}

impl Default for DupeConfig {
    fn default() -> Self {
        Self {
            policy: DupePolicy::MessageTitle,
            ttl_secs: DEFAULT_TTL_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone)]
struct Sighting {
    origin_id: String,
    seen_at: Instant,
    expires_at: Instant,
}

impl Sighting {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-wide duplicate checker.
///
/// Shared by every notification; checks are serialized behind a mutex so
/// the read-decide-record sequence is atomic.
pub struct DupeChecker {
    policy: DupePolicy,
    ttl: Duration,
    max_entries: usize,
    sightings: Mutex<HashMap<(String, Priority), Sighting>>,
}

impl DupeChecker {
    pub fn new(config: &DupeConfig) -> Self {
        Self::with_policy(
            config.policy,
            Duration::from_secs(config.ttl_secs),
            config.max_entries,
        )
    }

    pub fn with_policy(policy: DupePolicy, ttl: Duration, max_entries: usize) -> Self {
        Self {
            policy,
            ttl,
            max_entries: max_entries.max(1),
            sightings: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> DupePolicy {
        self.policy
    }

    /// Check a candidate and record the sighting.
    ///
    /// Returns true if the candidate duplicates an earlier one.
    pub fn check(&self, candidate: &impl DupeCandidate) -> bool {
        if self.policy == DupePolicy::None {
            return false;
        }

        let hash = candidate.content_hash();
        let now = Instant::now();
        let mut sightings = self.sightings.lock();
        sightings.retain(|_, s| !s.is_expired(now));

        let original = candidate
            .skip_priorities()
            .into_iter()
            .find_map(|p| sightings.get(&(hash.clone(), p)))
            .map(|s| s.origin_id.clone());

        sightings.insert(
            (hash, candidate.priority()),
            Sighting {
                origin_id: candidate.id().to_string(),
                seen_at: now,
                expires_at: now + self.ttl,
            },
        );

        while sightings.len() > self.max_entries {
            let oldest = sightings
                .iter()
                .min_by_key(|(_, s)| s.seen_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    sightings.remove(&key);
                }
                None => break,
            }
        }

        match original {
            Some(origin_id) => {
                debug!(
                    candidate = %candidate.id(),
                    original = %origin_id,
                    "Duplicate content detected"
                );
                true
            }
            None => false,
        }
    }

    /// Number of live sightings.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.sightings
            .lock()
            .values()
            .filter(|s| !s.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.sightings.lock().clear();
    }
}

impl Default for DupeChecker {
    fn default() -> Self {
        Self::new(&DupeConfig::default())
    }
}
