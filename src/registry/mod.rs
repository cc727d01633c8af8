//! # Worker Registry
//!
//! The main worker's table of subscribed processing workers. Records are
//! created by the Subscribe handshake, refreshed every time a worker
//! services an RPC, and transitioned to `Gone` once `last_seen` ages past
//! the TTL, lazily on lookup and by the background sweeper, so the admin
//! listing stays honest even without traffic. Entity routing round-robins
//! over the fresh `Available` records.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;

use crate::error::{DbError, DbResult, ErrorKind};

/// Default `worker-ttl`.
pub const DEFAULT_WORKER_TTL: Duration = Duration::from_secs(60);

/// Upper bound on concurrent subscriptions.
pub const DEFAULT_MAX_WORKERS: usize = 64;

const WORKER_TOKEN_LEN: usize = 48;

/// Lifecycle state of a subscribed worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Healthy; eligible for routing.
    Available,
    /// Last forward to it failed; skipped until it is seen again.
    Degraded,
    /// Not seen within the TTL; token rejected.
    Gone,
}

/// One subscribed worker.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub status: WorkerStatus,
    /// RPC address advertised at subscription; empty for a worker that
    /// cannot receive forwards.
    pub addr: String,
    pub key_id: String,
    pub wrapped_key_fingerprint: String,
    pub token: String,
    pub last_seen: DateTime<Utc>,
}

/// Listing form served by `GET /admin/workers`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub key_id: String,
    pub last_seen: DateTime<Utc>,
}

/// Concurrent worker table with TTL and round-robin selection.
pub struct WorkerRegistry {
    workers: DashMap<String, WorkerRecord>,
    cursor: AtomicUsize,
    ttl: chrono::Duration,
    max_workers: usize,
}

impl WorkerRegistry {
    pub fn new(ttl: Duration, max_workers: usize) -> Self {
        Self {
            workers: DashMap::new(),
            cursor: AtomicUsize::new(0),
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            max_workers,
        }
    }

    fn is_fresh(&self, record: &WorkerRecord, now: DateTime<Utc>) -> bool {
        now - record.last_seen < self.ttl
    }

    /// Record a subscription, replacing any previous record for the same
    /// `worker_id`. Returns the session token handed back to the worker.
    pub fn register(
        &self,
        worker_id: &str,
        addr: &str,
        key_id: &str,
        wrapped_key_fingerprint: &str,
    ) -> DbResult<String> {
        if worker_id.is_empty() {
            return Err(DbError::bad_input("worker_id must not be empty"));
        }
        if !self.workers.contains_key(worker_id) && self.workers.len() >= self.max_workers {
            return Err(DbError::new(
                ErrorKind::PayloadTooLarge,
                "worker subscription limit reached",
            ));
        }

        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(WORKER_TOKEN_LEN)
            .map(char::from)
            .collect();

        self.workers.insert(
            worker_id.to_string(),
            WorkerRecord {
                worker_id: worker_id.to_string(),
                status: WorkerStatus::Available,
                addr: addr.to_string(),
                key_id: key_id.to_string(),
                wrapped_key_fingerprint: wrapped_key_fingerprint.to_string(),
                token: token.clone(),
                last_seen: Utc::now(),
            },
        );
        Ok(token)
    }

    /// Refresh a worker's liveness after it services an RPC.
    pub fn touch(&self, worker_id: &str) {
        if let Some(mut record) = self.workers.get_mut(worker_id) {
            record.last_seen = Utc::now();
            if record.status != WorkerStatus::Gone {
                record.status = WorkerStatus::Available;
            }
        }
    }

    /// Mark a worker after a failed forward so routing skips it until it is
    /// seen again.
    pub fn mark_degraded(&self, worker_id: &str) {
        if let Some(mut record) = self.workers.get_mut(worker_id) {
            if record.status == WorkerStatus::Available {
                record.status = WorkerStatus::Degraded;
            }
        }
    }

    /// Pick the next routable worker: `Available`, fresh, and addressable.
    pub fn select(&self) -> Option<WorkerRecord> {
        let now = Utc::now();
        let mut candidates: Vec<WorkerRecord> = self
            .workers
            .iter()
            .filter(|entry| {
                let record = entry.value();
                record.status == WorkerStatus::Available
                    && !record.addr.is_empty()
                    && self.is_fresh(record, now)
            })
            .map(|entry| entry.value().clone())
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[index].clone())
    }

    /// Validate a Subscribe-issued token. Tokens of stale or `Gone` workers
    /// are rejected.
    pub fn verify_worker_token(&self, token: &str) -> Option<String> {
        let now = Utc::now();
        self.workers.iter().find_map(|entry| {
            let record = entry.value();
            if record.token == token
                && record.status != WorkerStatus::Gone
                && self.is_fresh(record, now)
            {
                Some(record.worker_id.clone())
            } else {
                None
            }
        })
    }

    /// Transition stale records to `Gone`. Run by the background sweeper.
    pub fn sweep(&self) {
        let now = Utc::now();
        for mut entry in self.workers.iter_mut() {
            if !self.is_fresh(entry.value(), now) {
                entry.value_mut().status = WorkerStatus::Gone;
            }
        }
    }

    /// Admin listing; applies lazy expiry so the reported status is current.
    pub fn list(&self) -> Vec<WorkerSummary> {
        let now = Utc::now();
        let mut summaries: Vec<WorkerSummary> = self
            .workers
            .iter()
            .map(|entry| {
                let record = entry.value();
                let status = if self.is_fresh(record, now) {
                    record.status
                } else {
                    WorkerStatus::Gone
                };
                WorkerSummary {
                    worker_id: record.worker_id.clone(),
                    status,
                    key_id: record.key_id.clone(),
                    last_seen: record.last_seen,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        summaries
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_WORKER_TTL, DEFAULT_MAX_WORKERS)
    }
}
