//! Fixed-retention round-robin archive
//!
//! One archive backs one series. Primary samples land in step-aligned
//! buckets; each bucket is consolidated on read with the archive's
//! function. Once more than `rows` buckets exist the oldest are dropped.

use crate::provider::Consolidation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default sample interval in seconds
pub const DEFAULT_STEP_SECS: i64 = 300;

/// Default number of consolidated rows kept per series
pub const DEFAULT_ROWS: usize = 50;

/// Shape of every series created by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub step_secs: i64,
    pub rows: usize,
    pub consolidation: Consolidation,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            step_secs: DEFAULT_STEP_SECS,
            rows: DEFAULT_ROWS,
            consolidation: Consolidation::Average,
        }
    }
}

impl RetentionPolicy {
    pub fn new(step_secs: i64, rows: usize) -> Self {
        Self {
            step_secs: step_secs.max(1),
            rows: rows.max(1),
            ..Default::default()
        }
    }

    /// Start of the bucket a timestamp falls into
    pub fn bucket(&self, timestamp: i64) -> i64 {
        timestamp - timestamp.rem_euclid(self.step_secs)
    }

    /// Seconds covered by the whole archive
    pub fn window_secs(&self) -> i64 {
        self.step_secs * self.rows as i64
    }
}

/// A consolidated row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Bucket start, seconds since the epoch
    pub timestamp: i64,
    pub value: f64,
}

/// Samples for one (entity, field)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    policy: RetentionPolicy,
    /// bucket start -> primary samples keyed by their exact timestamp
    buckets: BTreeMap<i64, BTreeMap<i64, f64>>,
    #[serde(skip)]
    dirty: bool,
}

impl Archive {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            buckets: BTreeMap::new(),
            dirty: true,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Oldest bucket start still accepted, if anything was written yet
    pub fn oldest_accepted(&self) -> Option<i64> {
        self.buckets
            .keys()
            .next_back()
            .map(|newest| newest - self.policy.step_secs * (self.policy.rows as i64 - 1))
    }

    /// Record a primary sample
    ///
    /// Returns the oldest accepted bucket start when the sample falls
    /// outside the retention window.
    pub fn insert(&mut self, timestamp: i64, value: f64) -> Result<(), i64> {
        let bucket = self.policy.bucket(timestamp);
        if let Some(oldest) = self.oldest_accepted() {
            if bucket < oldest {
                return Err(oldest);
            }
        }

        // Same timestamp overwrites
        self.buckets
            .entry(bucket)
            .or_default()
            .insert(timestamp, value);
        self.dirty = true;

        while self.buckets.len() > self.policy.rows {
            self.buckets.pop_first();
        }
        Ok(())
    }

    /// Consolidated rows of the buckets overlapping `[start, end]`, oldest first
    pub fn samples(&self, start: i64, end: i64) -> Vec<Sample> {
        if start > end {
            return Vec::new();
        }

        self.buckets
            .range(self.policy.bucket(start)..=end)
            .filter_map(|(bucket, primaries)| {
                let values: Vec<f64> = primaries.values().copied().collect();
                self.policy
                    .consolidation
                    .reduce(&values)
                    .map(|value| Sample {
                        timestamp: *bucket,
                        value,
                    })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
