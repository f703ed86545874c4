//! Share submissions and their validation outcomes.
//!
//! A share is ephemeral: it is validated once against the job it claims
//! to solve and never stored by this crate (duplicate tracking lives in
//! the referenced job's ledger). Validation either produces an
//! [`AcceptedShare`] or a [`ShareValidationError`] whose numeric code is
//! stable enough for protocol-level error signaling.

use std::{net::IpAddr, sync::Arc};

use bitcoin::hashes::sha256d;

use crate::job::Job;

/// A worker's candidate solution for a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitShare {
    /// Identifier of the job the worker believes it is solving.
    pub job_id: String,
    /// Shard pair claimed by the worker; must match the job exactly.
    pub from_shard: u32,
    pub to_shard: u32,
    /// Worker address the share is credited to.
    pub worker: String,
    /// Hex-encoded solution nonce.
    pub nonce: String,
}

/// A share that passed the full validation pipeline.
#[derive(Clone, Debug)]
pub struct AcceptedShare {
    /// The job the share solves.
    pub job: Arc<Job>,
    /// Decoded solution nonce.
    pub nonce: Vec<u8>,
    /// Remote address of the submitting session.
    pub remote_addr: IpAddr,
    /// Local port the session is connected to.
    pub local_port: u16,
    pub worker: String,
    /// Difficulty the share is credited at. This is the previous assigned
    /// difficulty when the share only cleared the pre-retarget threshold.
    pub difficulty: f64,
    /// Difficulty derived from the digest.
    pub share_difficulty: f64,
    /// Proof-of-work digest of the solution.
    pub digest: sha256d::Hash,
    /// Whether the digest also satisfies the job's block target.
    pub block_found: bool,
}

/// Why a share was rejected.
///
/// Every rejection has exactly one cause. The numeric codes are part of
/// the pool's protocol surface and must not be renumbered.
#[derive(Clone, Debug, PartialEq)]
pub enum ShareValidationError {
    /// The submitted identifier does not resolve to any valid job.
    JobNotFound,
    /// The claimed shard pair does not match the referenced job.
    ShardMismatch,
    /// The worker address is not valid for the destination shard.
    InvalidWorkerAddress,
    /// The nonce is not [`crate::job::NONCE_LENGTH`] bytes of hex.
    InvalidNonceSize,
    /// The `(worker, nonce)` pair was already submitted for this job.
    DuplicateShare,
    /// The digest clears neither the current nor the previous assigned
    /// difficulty. Carries all three difficulty values for diagnostics.
    LowDifficulty {
        share_difficulty: f64,
        current_difficulty: f64,
        previous_difficulty: Option<f64>,
    },
}

impl ShareValidationError {
    /// Stable numeric code used by the protocol layer.
    pub fn code(&self) -> u32 {
        match self {
            ShareValidationError::JobNotFound => 20,
            ShareValidationError::ShardMismatch => 21,
            ShareValidationError::InvalidWorkerAddress => 22,
            ShareValidationError::InvalidNonceSize => 23,
            ShareValidationError::DuplicateShare => 24,
            ShareValidationError::LowDifficulty { .. } => 25,
        }
    }
}

impl std::fmt::Display for ShareValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ShareValidationError::JobNotFound => write!(f, "job not found"),
            ShareValidationError::ShardMismatch => write!(f, "invalid shard pair"),
            ShareValidationError::InvalidWorkerAddress => write!(f, "invalid worker address"),
            ShareValidationError::InvalidNonceSize => write!(f, "incorrect size of nonce"),
            ShareValidationError::DuplicateShare => write!(f, "duplicate share"),
            ShareValidationError::LowDifficulty {
                share_difficulty,
                current_difficulty,
                previous_difficulty,
            } => match previous_difficulty {
                Some(previous) => write!(
                    f,
                    "low difficulty share of {share_difficulty}, current difficulty: {current_difficulty}, previous difficulty: {previous}"
                ),
                None => write!(
                    f,
                    "low difficulty share of {share_difficulty}, current difficulty: {current_difficulty}"
                ),
            },
        }
    }
}

impl std::error::Error for ShareValidationError {}
