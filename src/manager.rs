//! The job manager: batch installation of work units and the share
//! admission pipeline.
//!
//! ## Responsibilities
//!
//! - **Job Installation**: Assigns fresh identifiers to scheduler work
//!   units and installs them in the job store, one batch at a time, then
//!   publishes the updated slot view.
//! - **Share Validation**: Runs submissions through ordered checks
//!   (job lookup, shard pair, worker address, nonce size, duplicate
//!   defense) and classifies survivors against the assigned difficulty
//!   and the job's block target.
//! - **Eventing**: Publishes every job update and share resolution on the
//!   notification channel handed in at construction.
//!
//! ## Usage
//!
//! Construct one `JobManager` per pool process and share it behind an
//! `Arc`. Validation takes `&self` and may run from many sessions
//! concurrently; installations serialize on the store's write lock.

use std::{
    net::IpAddr,
    sync::{Arc, Mutex, RwLock},
};

use bitcoin::hashes::Hash as _;
use tracing::{debug, info};

use crate::{
    config::PoolConfig,
    event::{EventSender, PoolEvent, RejectedShare, ShareOutcome},
    id_factory::JobIdFactory,
    job::{Job, WorkUnit, NONCE_LENGTH},
    job_store::{JobStore, JobStoreError},
    share::{AcceptedShare, ShareValidationError, SubmitShare},
    target,
};

/// External predicate deciding whether a worker address may mine to a
/// destination shard.
///
/// Address encoding rules are chain specific and injected at manager
/// construction.
pub trait AddressValidator: Send + Sync {
    fn is_valid(&self, address: &str, to_shard: u32) -> bool;
}

impl<F> AddressValidator for F
where
    F: Fn(&str, u32) -> bool + Send + Sync,
{
    fn is_valid(&self, address: &str, to_shard: u32) -> bool {
        self(address, to_shard)
    }
}

/// Owner of the job store and the admission gate between untrusted
/// submissions and the rest of the pool.
pub struct JobManager {
    jobs: RwLock<JobStore>,
    id_factory: Mutex<JobIdFactory>,
    address_validator: Arc<dyn AddressValidator>,
    events: EventSender,
}

impl JobManager {
    /// Creates a manager publishing to `events` and deferring address
    /// checks to `address_validator`.
    pub fn new(
        config: &PoolConfig,
        address_validator: Arc<dyn AddressValidator>,
        events: EventSender,
    ) -> Self {
        Self {
            jobs: RwLock::new(JobStore::new(
                config.shard_count(),
                config.superseded_retention(),
            )),
            id_factory: Mutex::new(JobIdFactory::new()),
            address_validator,
            events,
        }
    }

    /// Installs a batch of work units as the current jobs for their shard
    /// pairs and publishes one [`PoolEvent::JobsUpdated`] for the whole
    /// batch.
    ///
    /// Every unit's shard pair is checked before any job is installed: an
    /// out-of-range index is upstream misconfiguration and fails the
    /// whole batch, leaving the store untouched. Observers of the event
    /// channel never see a partially installed batch.
    pub fn install_batch(&self, units: Vec<WorkUnit>) -> Result<(), JobStoreError> {
        let snapshot = {
            let mut jobs = self.jobs.write().expect("job store lock poisoned");
            for unit in &units {
                jobs.check_shard_pair(unit.from_shard, unit.to_shard)?;
            }
            let mut id_factory = self.id_factory.lock().expect("id factory lock poisoned");
            for unit in units {
                let job = Job::new(id_factory.next(), unit);
                jobs.insert(job).expect("shard pair checked before install");
            }
            jobs.snapshot()
        };
        info!(
            "installed new jobs, {} shard pairs active",
            snapshot.iter().flatten().count()
        );
        self.events.send(PoolEvent::JobsUpdated(snapshot));
        Ok(())
    }

    /// Runs a submission through the admission pipeline.
    ///
    /// Checks run in a fixed order and the first failure decides the
    /// rejection code. Every resolution is also published as a
    /// [`PoolEvent::ShareResolved`], so the caller can answer the worker
    /// from the return value alone while collaborators observe the
    /// channel.
    ///
    /// `previous_difficulty` is the worker's assignment from before the
    /// last retarget, if any; a share that only clears it is still
    /// accepted, credited at that previous value.
    pub fn validate_share(
        &self,
        submission: &SubmitShare,
        previous_difficulty: Option<f64>,
        difficulty: f64,
        remote_addr: IpAddr,
        local_port: u16,
    ) -> Result<AcceptedShare, ShareValidationError> {
        let job = {
            let jobs = self.jobs.read().expect("job store lock poisoned");
            jobs.get(&submission.job_id)
        };
        let job = match job {
            Some(job) => job,
            None => {
                return Err(self.reject(
                    submission,
                    remote_addr,
                    difficulty,
                    ShareValidationError::JobNotFound,
                ))
            }
        };

        if submission.from_shard != job.from_shard() || submission.to_shard != job.to_shard() {
            return Err(self.reject(
                submission,
                remote_addr,
                difficulty,
                ShareValidationError::ShardMismatch,
            ));
        }

        if !self
            .address_validator
            .is_valid(&submission.worker, submission.to_shard)
        {
            return Err(self.reject(
                submission,
                remote_addr,
                difficulty,
                ShareValidationError::InvalidWorkerAddress,
            ));
        }

        // a nonce that does not even decode cannot have the right size
        let nonce = match hex::decode(&submission.nonce) {
            Ok(nonce) if nonce.len() == NONCE_LENGTH => nonce,
            _ => {
                return Err(self.reject(
                    submission,
                    remote_addr,
                    difficulty,
                    ShareValidationError::InvalidNonceSize,
                ))
            }
        };

        if !job.register_submit(&submission.worker, &nonce) {
            return Err(self.reject(
                submission,
                remote_addr,
                difficulty,
                ShareValidationError::DuplicateShare,
            ));
        }

        // hashing happens outside any store lock
        let digest = job.hash(&nonce);
        let digest_value = target::digest_to_u256(digest.as_byte_array());
        let share_difficulty = target::difficulty(digest_value);

        debug!(
            "share validation\ndigest:\t\t{}\njob target:\t{}\nshare difficulty: {}",
            target::bytes_to_hex(digest.as_byte_array()),
            target::bytes_to_hex(&job.target().to_big_endian()),
            share_difficulty
        );

        // a digest at or below the job target solves a block, whatever
        // the worker's assigned difficulty
        let block_found = digest_value <= job.target();

        let mut credited_difficulty = difficulty;
        if !block_found && share_difficulty < difficulty {
            match previous_difficulty {
                // share raced a retarget; credit it at the old assignment
                Some(previous) if share_difficulty >= previous => {
                    credited_difficulty = previous;
                }
                _ => {
                    return Err(self.reject(
                        submission,
                        remote_addr,
                        difficulty,
                        ShareValidationError::LowDifficulty {
                            share_difficulty,
                            current_difficulty: difficulty,
                            previous_difficulty,
                        },
                    ))
                }
            }
        }

        let accepted = AcceptedShare {
            job,
            nonce,
            remote_addr,
            local_port,
            worker: submission.worker.clone(),
            difficulty: credited_difficulty,
            share_difficulty,
            digest,
            block_found,
        };
        self.events.send(PoolEvent::ShareResolved(ShareOutcome::Accepted(
            accepted.clone(),
        )));
        Ok(accepted)
    }

    // Publishes the minimal rejection record and hands the reason back to
    // the caller.
    fn reject(
        &self,
        submission: &SubmitShare,
        remote_addr: IpAddr,
        difficulty: f64,
        reason: ShareValidationError,
    ) -> ShareValidationError {
        self.events
            .send(PoolEvent::ShareResolved(ShareOutcome::Rejected(
                RejectedShare {
                    job_id: submission.job_id.clone(),
                    remote_addr,
                    worker: submission.worker.clone(),
                    difficulty,
                    reason: reason.clone(),
                },
            )));
        reason
    }

    /// Current job for an ordered shard pair.
    pub fn current_job(&self, from_shard: u32, to_shard: u32) -> Option<Arc<Job>> {
        self.jobs
            .read()
            .expect("job store lock poisoned")
            .current(from_shard, to_shard)
    }

    /// Number of jobs still acceptable for submission.
    pub fn valid_job_count(&self) -> usize {
        self.jobs
            .read()
            .expect("job store lock poisoned")
            .valid_job_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_channel;
    use bitcoin::hashes::Hash as _;
    use primitive_types::U256;
    use std::net::Ipv4Addr;

    const REMOTE: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
    const LOCAL_PORT: u16 = 3032;

    fn manager(shard_count: u32) -> (Arc<JobManager>, async_channel::Receiver<PoolEvent>) {
        let (events, rx) = event_channel();
        let config = PoolConfig::new(shard_count, 8);
        let validator: Arc<dyn AddressValidator> = Arc::new(|_: &str, _: u32| true);
        (Arc::new(JobManager::new(&config, validator, events)), rx)
    }

    fn unit(from_shard: u32, to_shard: u32, target: U256) -> WorkUnit {
        WorkUnit {
            from_shard,
            to_shard,
            target,
            header_blob: vec![from_shard as u8, to_shard as u8, 0x42],
        }
    }

    fn nonce_hex(seed: u8) -> String {
        hex::encode([seed; NONCE_LENGTH])
    }

    fn submission(job_id: &str, from_shard: u32, to_shard: u32, nonce: &str) -> SubmitShare {
        SubmitShare {
            job_id: job_id.to_string(),
            from_shard,
            to_shard,
            worker: "worker.1".to_string(),
            nonce: nonce.to_string(),
        }
    }

    fn drain_jobs_updated(rx: &async_channel::Receiver<PoolEvent>) {
        while let Ok(event) = rx.try_recv() {
            if let PoolEvent::ShareResolved(_) = event {
                panic!("unexpected share resolution while draining job updates");
            }
        }
    }

    #[test]
    fn batch_install_emits_one_snapshot() {
        let (manager, rx) = manager(4);
        manager
            .install_batch(vec![
                unit(0, 1, U256::zero()),
                unit(1, 2, U256::zero()),
            ])
            .unwrap();

        match rx.try_recv().unwrap() {
            PoolEvent::JobsUpdated(snapshot) => {
                assert_eq!(snapshot.len(), 16);
                assert_eq!(snapshot.iter().flatten().count(), 2);
            }
            other => panic!("expected JobsUpdated, got {other:?}"),
        }
        // one event per batch, not per unit
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn out_of_range_unit_fails_the_whole_batch() {
        let (manager, rx) = manager(4);
        let err = manager
            .install_batch(vec![unit(0, 1, U256::zero()), unit(7, 0, U256::zero())])
            .unwrap_err();

        assert!(matches!(err, JobStoreError::ShardOutOfRange { .. }));
        assert_eq!(manager.valid_job_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn replaced_job_stays_valid_for_in_flight_shares() {
        let (manager, _rx) = manager(4);
        manager.install_batch(vec![unit(0, 1, U256::zero())]).unwrap();
        let first_id = manager.current_job(0, 1).unwrap().job_id().to_string();
        manager.install_batch(vec![unit(0, 1, U256::zero())]).unwrap();

        assert_ne!(manager.current_job(0, 1).unwrap().job_id(), first_id);
        assert_eq!(manager.valid_job_count(), 2);

        // a share against the superseded identifier is still admissible
        let result = manager.validate_share(
            &submission(&first_id, 0, 1, &nonce_hex(1)),
            None,
            0.0,
            REMOTE,
            LOCAL_PORT,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn unknown_job_is_rejected_with_code_20() {
        let (manager, rx) = manager(4);
        manager.install_batch(vec![unit(0, 1, U256::zero())]).unwrap();
        drain_jobs_updated(&rx);

        let err = manager
            .validate_share(
                &submission("ff", 0, 1, &nonce_hex(1)),
                None,
                1.0,
                REMOTE,
                LOCAL_PORT,
            )
            .unwrap_err();
        assert_eq!(err, ShareValidationError::JobNotFound);
        assert_eq!(err.code(), 20);

        match rx.try_recv().unwrap() {
            PoolEvent::ShareResolved(ShareOutcome::Rejected(rejected)) => {
                assert_eq!(rejected.job_id, "ff");
                assert_eq!(rejected.worker, "worker.1");
                assert_eq!(rejected.difficulty, 1.0);
                assert_eq!(rejected.reason.code(), 20);
            }
            other => panic!("expected rejection event, got {other:?}"),
        }
    }

    #[test]
    fn shard_mismatch_beats_every_other_valid_field() {
        let (manager, _rx) = manager(4);
        manager.install_batch(vec![unit(0, 1, U256::MAX)]).unwrap();
        let job_id = manager.current_job(0, 1).unwrap().job_id().to_string();

        let err = manager
            .validate_share(
                &submission(&job_id, 1, 0, &nonce_hex(1)),
                None,
                0.0,
                REMOTE,
                LOCAL_PORT,
            )
            .unwrap_err();
        assert_eq!(err, ShareValidationError::ShardMismatch);
        assert_eq!(err.code(), 21);
    }

    #[test]
    fn invalid_worker_address_is_rejected() {
        let (events, _rx) = event_channel();
        let validator: Arc<dyn AddressValidator> =
            Arc::new(|address: &str, _: u32| address != "worker.1");
        let manager = JobManager::new(&PoolConfig::new(4, 8), validator, events);
        manager.install_batch(vec![unit(0, 1, U256::zero())]).unwrap();
        let job_id = manager.current_job(0, 1).unwrap().job_id().to_string();

        let err = manager
            .validate_share(
                &submission(&job_id, 0, 1, &nonce_hex(1)),
                None,
                0.0,
                REMOTE,
                LOCAL_PORT,
            )
            .unwrap_err();
        assert_eq!(err, ShareValidationError::InvalidWorkerAddress);
        assert_eq!(err.code(), 22);
    }

    #[test]
    fn wrong_nonce_size_leaves_the_ledger_untouched() {
        let (manager, _rx) = manager(4);
        manager.install_batch(vec![unit(0, 1, U256::zero())]).unwrap();
        let job = manager.current_job(0, 1).unwrap();

        let too_long = "00".repeat(NONCE_LENGTH + 1);
        for bad_nonce in ["0102", too_long.as_str(), "not hex at all"] {
            let err = manager
                .validate_share(
                    &submission(job.job_id(), 0, 1, bad_nonce),
                    None,
                    0.0,
                    REMOTE,
                    LOCAL_PORT,
                )
                .unwrap_err();
            assert_eq!(err, ShareValidationError::InvalidNonceSize);
            assert_eq!(err.code(), 23);
        }
        assert_eq!(job.submit_count(), 0);
    }

    #[test]
    fn duplicate_submission_is_rejected_once_recorded() {
        let (manager, _rx) = manager(4);
        manager.install_batch(vec![unit(0, 1, U256::zero())]).unwrap();
        let job_id = manager.current_job(0, 1).unwrap().job_id().to_string();
        let share = submission(&job_id, 0, 1, &nonce_hex(9));

        assert!(manager
            .validate_share(&share, None, 0.0, REMOTE, LOCAL_PORT)
            .is_ok());
        let err = manager
            .validate_share(&share, None, 0.0, REMOTE, LOCAL_PORT)
            .unwrap_err();
        assert_eq!(err, ShareValidationError::DuplicateShare);
        assert_eq!(err.code(), 24);

        // a different worker submitting the same nonce is not a duplicate
        let mut other_worker = share;
        other_worker.worker = "worker.2".to_string();
        assert!(manager
            .validate_share(&other_worker, None, 0.0, REMOTE, LOCAL_PORT)
            .is_ok());
    }

    #[test]
    fn concurrent_duplicates_yield_exactly_one_acceptance() {
        let (manager, _rx) = manager(4);
        manager.install_batch(vec![unit(0, 1, U256::MAX)]).unwrap();
        let job_id = manager.current_job(0, 1).unwrap().job_id().to_string();

        let mut handles = vec![];
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            let share = submission(&job_id, 0, 1, &nonce_hex(5));
            handles.push(std::thread::spawn(move || {
                manager.validate_share(&share, None, 0.0, REMOTE, LOCAL_PORT)
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let accepted = results.iter().filter(|r| r.is_ok()).count();
        let duplicates = results
            .iter()
            .filter(|r| matches!(r, Err(ShareValidationError::DuplicateShare)))
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(duplicates, 7);
    }

    #[test]
    fn ordinary_share_is_accepted_below_block_target() {
        let (manager, rx) = manager(4);
        // zero target: no digest can solve a block
        manager.install_batch(vec![unit(0, 1, U256::zero())]).unwrap();
        drain_jobs_updated(&rx);
        let job_id = manager.current_job(0, 1).unwrap().job_id().to_string();

        let accepted = manager
            .validate_share(
                &submission(&job_id, 0, 1, &nonce_hex(3)),
                None,
                0.0,
                REMOTE,
                LOCAL_PORT,
            )
            .unwrap();

        assert!(!accepted.block_found);
        assert_eq!(accepted.difficulty, 0.0);
        assert!(accepted.share_difficulty > 0.0);
        assert_eq!(accepted.worker, "worker.1");
        assert_eq!(accepted.local_port, LOCAL_PORT);

        match rx.try_recv().unwrap() {
            PoolEvent::ShareResolved(ShareOutcome::Accepted(event_share)) => {
                assert_eq!(event_share.digest, accepted.digest);
                assert_eq!(event_share.nonce, accepted.nonce);
                assert!(!event_share.block_found);
            }
            other => panic!("expected acceptance event, got {other:?}"),
        }
    }

    #[test]
    fn block_candidate_overrides_assigned_difficulty() {
        let (manager, _rx) = manager(4);
        // max target: every digest solves a block
        manager.install_batch(vec![unit(0, 1, U256::MAX)]).unwrap();
        let job_id = manager.current_job(0, 1).unwrap().job_id().to_string();

        let accepted = manager
            .validate_share(
                &submission(&job_id, 0, 1, &nonce_hex(4)),
                None,
                f64::MAX,
                REMOTE,
                LOCAL_PORT,
            )
            .unwrap();

        assert!(accepted.block_found);
        // credited at the assigned difficulty, not the fallback
        assert_eq!(accepted.difficulty, f64::MAX);
    }

    #[test]
    fn share_clearing_only_the_previous_difficulty_is_credited_there() {
        let (manager, _rx) = manager(4);
        manager.install_batch(vec![unit(0, 1, U256::zero())]).unwrap();
        let job = manager.current_job(0, 1).unwrap();
        let job_id = job.job_id().to_string();

        // derive the actual difficulty this nonce produces
        let nonce = [6u8; NONCE_LENGTH];
        let digest = job.hash(&nonce);
        let d = target::difficulty(target::digest_to_u256(digest.as_byte_array()));
        let share = submission(&job_id, 0, 1, &hex::encode(nonce));

        let accepted = manager
            .validate_share(&share, Some(d / 2.0), d * 2.0, REMOTE, LOCAL_PORT)
            .unwrap();
        assert_eq!(accepted.share_difficulty, d);
        assert_eq!(accepted.difficulty, d / 2.0);
        assert!(!accepted.block_found);
    }

    #[test]
    fn share_below_both_difficulties_is_rejected_with_all_values() {
        let (manager, _rx) = manager(4);
        manager.install_batch(vec![unit(0, 1, U256::zero())]).unwrap();
        let job = manager.current_job(0, 1).unwrap();
        let job_id = job.job_id().to_string();

        let nonce = [8u8; NONCE_LENGTH];
        let digest = job.hash(&nonce);
        let d = target::difficulty(target::digest_to_u256(digest.as_byte_array()));
        let share = submission(&job_id, 0, 1, &hex::encode(nonce));

        let err = manager
            .validate_share(&share, Some(d * 1.5), d * 2.0, REMOTE, LOCAL_PORT)
            .unwrap_err();
        match err {
            ShareValidationError::LowDifficulty {
                share_difficulty,
                current_difficulty,
                previous_difficulty,
            } => {
                assert_eq!(share_difficulty, d);
                assert_eq!(current_difficulty, d * 2.0);
                assert_eq!(previous_difficulty, Some(d * 1.5));
            }
            other => panic!("expected LowDifficulty, got {other:?}"),
        }
    }

    #[test]
    fn missing_previous_difficulty_means_no_fallback() {
        let (manager, _rx) = manager(4);
        manager.install_batch(vec![unit(0, 1, U256::zero())]).unwrap();
        let job = manager.current_job(0, 1).unwrap();
        let job_id = job.job_id().to_string();

        let nonce = [2u8; NONCE_LENGTH];
        let digest = job.hash(&nonce);
        let d = target::difficulty(target::digest_to_u256(digest.as_byte_array()));
        let share = submission(&job_id, 0, 1, &hex::encode(nonce));

        let err = manager
            .validate_share(&share, None, d * 2.0, REMOTE, LOCAL_PORT)
            .unwrap_err();
        assert_eq!(err.code(), 25);
    }
}
