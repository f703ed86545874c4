//! Work units and installed jobs.
//!
//! A [`WorkUnit`] is the contract with the upstream work scheduler; a
//! [`Job`] is a unit installed in the job store under a freshly issued
//! identifier. Jobs own their submission ledger and expose the
//! proof-of-work digest capability used during share validation.

use std::{collections::HashSet, sync::Mutex};

use bitcoin::hashes::{sha256d, Hash};
use primitive_types::U256;

/// Exact byte length of a valid solution nonce.
pub const NONCE_LENGTH: usize = 24;

/// One unit of work produced by the upstream scheduler, scoped to an
/// ordered shard pair.
///
/// `target` is the block-level acceptance target: digests at or below it
/// solve a block. `header_blob` is the opaque pre-image the proof-of-work
/// digest commits to; this crate never interprets it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkUnit {
    pub from_shard: u32,
    pub to_shard: u32,
    pub target: U256,
    pub header_blob: Vec<u8>,
}

/// A work assignment installed in the job store.
///
/// Immutable once installed, except for the submission ledger, which only
/// grows. The ledger has its own lock, so contention on one job's ledger
/// never blocks validation against another job.
#[derive(Debug)]
pub struct Job {
    job_id: String,
    from_shard: u32,
    to_shard: u32,
    target: U256,
    header_blob: Vec<u8>,
    submits: Mutex<HashSet<(String, Vec<u8>)>>,
}

impl Job {
    /// Builds a job from a scheduler work unit and a freshly issued
    /// identifier.
    pub fn new(job_id: String, unit: WorkUnit) -> Self {
        Self {
            job_id,
            from_shard: unit.from_shard,
            to_shard: unit.to_shard,
            target: unit.target,
            header_blob: unit.header_blob,
            submits: Mutex::new(HashSet::new()),
        }
    }

    /// Identifier this job was installed under.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn from_shard(&self) -> u32 {
        self.from_shard
    }

    pub fn to_shard(&self) -> u32 {
        self.to_shard
    }

    /// Block-level acceptance target for this job.
    pub fn target(&self) -> U256 {
        self.target
    }

    /// Records a `(worker, nonce)` submission, returning `false` if the
    /// pair was already seen on this job.
    ///
    /// Check and record happen under one lock: of N racing identical
    /// submissions exactly one observes `true`. The ledger is never
    /// rolled back.
    pub fn register_submit(&self, worker: &str, nonce: &[u8]) -> bool {
        let mut submits = self
            .submits
            .lock()
            .expect("job submission ledger poisoned");
        submits.insert((worker.to_string(), nonce.to_vec()))
    }

    /// Number of distinct submissions recorded on this job.
    pub fn submit_count(&self) -> usize {
        self.submits
            .lock()
            .expect("job submission ledger poisoned")
            .len()
    }

    /// Proof-of-work digest for a candidate nonce: double SHA-256 over
    /// the nonce followed by the header blob.
    pub fn hash(&self, nonce: &[u8]) -> sha256d::Hash {
        let mut preimage = Vec::with_capacity(nonce.len() + self.header_blob.len());
        preimage.extend_from_slice(nonce);
        preimage.extend_from_slice(&self.header_blob);
        sha256d::Hash::hash(&preimage)
    }
}
