//! Notifications published by the job manager.
//!
//! Collaborators (protocol sessions, share persistence, block
//! broadcasting) subscribe by constructing the manager with the sending
//! side of a channel and reading [`PoolEvent`]s from the receiving side.
//! The channel is observational: validation results also reach the
//! immediate caller through return values, so a slow or absent consumer
//! never stalls admission.

use std::{net::IpAddr, sync::Arc};

use tracing::warn;

use crate::{
    job::Job,
    share::{AcceptedShare, ShareValidationError},
};

/// Minimal record describing a rejected share.
///
/// Carries no digest data: rejection happens before or during the
/// difficulty check, and the low-difficulty reason already holds the
/// difficulty values involved.
#[derive(Clone, Debug)]
pub struct RejectedShare {
    /// Identifier the worker submitted against (possibly unknown).
    pub job_id: String,
    pub remote_addr: IpAddr,
    pub worker: String,
    /// The worker's assigned difficulty at submission time.
    pub difficulty: f64,
    pub reason: ShareValidationError,
}

/// Resolution of one submission, either way.
#[derive(Clone, Debug)]
pub enum ShareOutcome {
    Accepted(AcceptedShare),
    Rejected(RejectedShare),
}

/// Messages published by the job manager.
#[derive(Clone, Debug)]
pub enum PoolEvent {
    /// New work was installed. Carries the full slot-view snapshot, one
    /// entry per shard pair that has ever been filled; emitted once per
    /// batch, never for partial batches.
    JobsUpdated(Vec<Option<Arc<Job>>>),
    /// A submission was resolved.
    ShareResolved(ShareOutcome),
}

/// Sending side of the notification channel, handed to the manager at
/// construction.
#[derive(Clone, Debug)]
pub struct EventSender {
    inner: async_channel::Sender<PoolEvent>,
}

impl EventSender {
    pub fn new(inner: async_channel::Sender<PoolEvent>) -> Self {
        Self { inner }
    }

    /// Publishes an event without blocking.
    ///
    /// Meant for an unbounded channel; if every receiver is gone the
    /// event is dropped.
    pub fn send(&self, event: PoolEvent) {
        if let Err(e) = self.inner.try_send(event) {
            warn!("dropping pool event, no live receiver: {e}");
        }
    }
}

/// Creates an unbounded notification channel.
pub fn event_channel() -> (EventSender, async_channel::Receiver<PoolEvent>) {
    let (tx, rx) = async_channel::unbounded();
    (EventSender::new(tx), rx)
}
