//! Audit collaborator for "who did what"
//!
//! The election core pushes one [`AuditEvent`] per successful mutation into an
//! injected [`AuditSink`] and never reads it back. Sink failures are logged and
//! swallowed: an unavailable audit log must not block or roll back a vote.
//!
//! Two sinks ship with the crate:
//! - [`AuditTrail`]: bounded in-memory trail with a blake3 hash chain, so that
//!   tampering with or dropping a record in the middle is detectable
//! - [`TracingAuditSink`]: forwards events to `tracing` under the
//!   `assembly_vote::audit` target

use crate::types::UserId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// A single "actor did action at timestamp" fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor: UserId,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn now(actor: UserId, action: impl Into<String>) -> Self {
        Self {
            actor,
            action: action.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Fire-and-forget sink for audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<()>;
}

/// Record an event, logging instead of propagating any sink failure
pub(crate) fn record_best_effort(sink: &dyn AuditSink, actor: UserId, action: String) {
    if let Err(e) = sink.record(AuditEvent::now(actor, action.clone())) {
        tracing::warn!(%actor, %action, error = %e, "audit record dropped");
    }
}

/// Sink that only emits `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<()> {
        tracing::info!(
            target: "assembly_vote::audit",
            actor = %event.actor,
            timestamp = %event.timestamp,
            "{}",
            event.action
        );
        Ok(())
    }
}

/// An audit event with its place in the hash chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonically increasing, starting at 1
    pub sequence_number: u64,
    pub event: AuditEvent,
    /// Hex hash of the preceding record, `None` for the very first record
    pub previous_hash: Option<String>,
    /// Hex blake3 hash over the event and `previous_hash`
    pub record_hash: String,
}

impl AuditRecord {
    fn new(sequence_number: u64, event: AuditEvent, previous_hash: Option<String>) -> Result<Self> {
        let record_hash = Self::compute_hash(sequence_number, &event, previous_hash.as_deref())?;
        Ok(Self {
            sequence_number,
            event,
            previous_hash,
            record_hash,
        })
    }

    fn compute_hash(
        sequence_number: u64,
        event: &AuditEvent,
        previous_hash: Option<&str>,
    ) -> Result<String> {
        let content = serde_json::to_vec(&(sequence_number, event, previous_hash))?;
        Ok(hex::encode(blake3::hash(&content).as_bytes()))
    }

    /// Whether the stored hash still matches the record content
    pub fn verify(&self) -> Result<bool> {
        let expected = Self::compute_hash(
            self.sequence_number,
            &self.event,
            self.previous_hash.as_deref(),
        )?;
        Ok(expected == self.record_hash)
    }
}

/// Result of [`AuditTrail::verify_integrity`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditIntegrityReport {
    pub records_checked: usize,
    /// Sequence numbers whose hash or chain link does not verify
    pub violations: Vec<u64>,
    pub chain_valid: bool,
}

/// Counters for an [`AuditTrail`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditTrailStatistics {
    pub total_records: u64,
    pub records_in_memory: usize,
    pub evicted_records: u64,
}

struct TrailState {
    records: VecDeque<AuditRecord>,
    next_sequence: u64,
    last_hash: Option<String>,
    evicted: u64,
}

/// Bounded, hash-chained in-memory audit trail
pub struct AuditTrail {
    state: Mutex<TrailState>,
    capacity: usize,
}

impl AuditTrail {
    /// Create a trail keeping at most `capacity` records (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(TrailState {
                records: VecDeque::new(),
                next_sequence: 1,
                last_hash: None,
                evicted: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, TrailState>> {
        self.state
            .lock()
            .map_err(|_| Error::internal("Audit trail lock poisoned"))
    }

    /// Records currently held, oldest first
    pub fn records(&self) -> Result<Vec<AuditRecord>> {
        Ok(self.lock()?.records.iter().cloned().collect())
    }

    pub fn records_by_actor(&self, actor: UserId) -> Result<Vec<AuditRecord>> {
        Ok(self
            .lock()?
            .records
            .iter()
            .filter(|r| r.event.actor == actor)
            .cloned()
            .collect())
    }

    pub fn statistics(&self) -> Result<AuditTrailStatistics> {
        let state = self.lock()?;
        Ok(AuditTrailStatistics {
            total_records: state.next_sequence - 1,
            records_in_memory: state.records.len(),
            evicted_records: state.evicted,
        })
    }

    /// Check every held record's hash and its link to the previous record
    ///
    /// The oldest held record may point at an evicted predecessor, so its link
    /// is taken as given.
    pub fn verify_integrity(&self) -> Result<AuditIntegrityReport> {
        let state = self.lock()?;
        let mut violations = Vec::new();
        let mut expected_previous = state.records.front().and_then(|r| r.previous_hash.clone());

        for record in &state.records {
            if !record.verify()? || record.previous_hash != expected_previous {
                violations.push(record.sequence_number);
            }
            expected_previous = Some(record.record_hash.clone());
        }

        Ok(AuditIntegrityReport {
            records_checked: state.records.len(),
            chain_valid: violations.is_empty(),
            violations,
        })
    }

    /// Export held records as JSON lines for an external auditor
    pub fn export_json_lines(&self) -> Result<String> {
        let state = self.lock()?;
        let mut out = String::new();
        for record in &state.records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }

    #[cfg(test)]
    fn tamper(&self, sequence_number: u64, action: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state
            .records
            .iter_mut()
            .find(|r| r.sequence_number == sequence_number)
        {
            record.event.action = action.to_string();
        }
    }
}

impl AuditSink for AuditTrail {
    fn record(&self, event: AuditEvent) -> Result<()> {
        let mut state = self.lock()?;
        let sequence_number = state.next_sequence;
        let record = AuditRecord::new(sequence_number, event, state.last_hash.clone())?;

        state.last_hash = Some(record.record_hash.clone());
        state.next_sequence += 1;
        state.records.push_back(record);

        while state.records.len() > self.capacity {
            state.records.pop_front();
            state.evicted += 1;
        }

        tracing::debug!(sequence_number, "audit record added");
        Ok(())
    }
}
