//! Storage of live jobs.
//!
//! Two co-maintained views over the same job entities:
//!
//! - a slot view of `shard_count²` entries, at most one current job per
//!   ordered shard pair, where installing a job for an occupied pair
//!   replaces the previous one;
//! - an identifier map of every job still acceptable for submission,
//!   which keeps superseded jobs alive for in-flight shares until they
//!   age out of a bounded retention queue.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use crate::job::Job;

/// Install-time errors.
///
/// These indicate upstream misconfiguration, never bad submission input:
/// submission failures have their own taxonomy in
/// [`crate::share::ShareValidationError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStoreError {
    /// A work unit referenced a shard index outside the configured shard
    /// count.
    ShardOutOfRange {
        from_shard: u32,
        to_shard: u32,
        shard_count: u32,
    },
}

impl std::fmt::Display for JobStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            JobStoreError::ShardOutOfRange {
                from_shard,
                to_shard,
                shard_count,
            } => write!(
                f,
                "shard pair ({from_shard}, {to_shard}) out of range for {shard_count} shards"
            ),
        }
    }
}

impl std::error::Error for JobStoreError {}

/// Live jobs, indexed by shard pair and by identifier.
#[derive(Debug)]
pub struct JobStore {
    shard_count: u32,
    // Slot view: index = from_shard * shard_count + to_shard
    current_jobs: Vec<Option<Arc<Job>>>,
    // Every job still valid for submission, indexed by identifier
    valid_jobs: HashMap<String, Arc<Job>>,
    // Identifiers of superseded jobs, oldest first
    superseded: VecDeque<String>,
    superseded_retention: usize,
}

impl JobStore {
    /// Creates an empty store for `shard_count` shards, retaining at most
    /// `superseded_retention` superseded jobs in the identifier map.
    pub fn new(shard_count: u32, superseded_retention: usize) -> Self {
        Self {
            shard_count,
            current_jobs: vec![None; (shard_count * shard_count) as usize],
            valid_jobs: HashMap::new(),
            superseded: VecDeque::new(),
            superseded_retention,
        }
    }

    fn slot_index(&self, from_shard: u32, to_shard: u32) -> usize {
        (from_shard * self.shard_count + to_shard) as usize
    }

    /// Ensures an ordered shard pair fits the configured shard count.
    pub fn check_shard_pair(&self, from_shard: u32, to_shard: u32) -> Result<(), JobStoreError> {
        if from_shard >= self.shard_count || to_shard >= self.shard_count {
            return Err(JobStoreError::ShardOutOfRange {
                from_shard,
                to_shard,
                shard_count: self.shard_count,
            });
        }
        Ok(())
    }

    /// Installs a job as the current one for its shard pair.
    ///
    /// The replaced job, if any, stays reachable through the identifier
    /// map until it ages out of the retention queue.
    pub fn insert(&mut self, job: Job) -> Result<(), JobStoreError> {
        self.check_shard_pair(job.from_shard(), job.to_shard())?;
        let index = self.slot_index(job.from_shard(), job.to_shard());
        let job = Arc::new(job);
        if let Some(replaced) = self.current_jobs[index].replace(Arc::clone(&job)) {
            self.superseded.push_back(replaced.job_id().to_string());
        }
        self.valid_jobs.insert(job.job_id().to_string(), job);
        self.prune_superseded();
        Ok(())
    }

    // Keeps the superseded backlog bounded. An identifier held by a
    // current slot is never pruned, even if counter wrap re-queued it.
    fn prune_superseded(&mut self) {
        while self.superseded.len() > self.superseded_retention {
            if let Some(job_id) = self.superseded.pop_front() {
                let slot_current = self
                    .current_jobs
                    .iter()
                    .flatten()
                    .any(|job| job.job_id() == job_id);
                if !slot_current {
                    self.valid_jobs.remove(&job_id);
                }
            }
        }
    }

    /// Looks up a job still valid for submission by identifier.
    pub fn get(&self, job_id: &str) -> Option<Arc<Job>> {
        self.valid_jobs.get(job_id).cloned()
    }

    /// Current job for an ordered shard pair, if one was ever installed.
    pub fn current(&self, from_shard: u32, to_shard: u32) -> Option<Arc<Job>> {
        if self.check_shard_pair(from_shard, to_shard).is_err() {
            return None;
        }
        self.current_jobs[self.slot_index(from_shard, to_shard)].clone()
    }

    /// Clone of the full slot view, one entry per shard pair.
    pub fn snapshot(&self) -> Vec<Option<Arc<Job>>> {
        self.current_jobs.clone()
    }

    /// Number of jobs still acceptable for submission.
    pub fn valid_job_count(&self) -> usize {
        self.valid_jobs.len()
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }
}
