//! # Shard Pool Core
//!
//! `shard_pool` provides the job-dispatch and share-admission primitives of a
//! mining pool for a sharded proof-of-work chain.
//!
//! Work assignments are scoped to an ordered pair of shards and indexed both
//! by shard pair (at most one current job per pair) and by job identifier
//! (every job still acceptable for submission). Incoming share submissions
//! are run through an ordered validation pipeline and classified as ordinary
//! shares or block candidates.
//!
//! ## Features
//!
//! - Unique job identifier issuance with bounded wrap-around
//! - Job storage with per-shard-pair slot replacement and bounded retention
//!   of superseded jobs
//! - Share validation: structural checks, duplicate defense, difficulty
//!   comparison with retarget fallback, block candidate detection
//! - Notification channel publishing job updates and share resolutions

pub mod config;
pub mod event;
pub mod id_factory;
pub mod job;
pub mod job_store;
pub mod manager;
pub mod share;
pub mod target;
