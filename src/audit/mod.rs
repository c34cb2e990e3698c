//! Turn audit log
//!
//! Keeps a diagnostic record of every completed turn in memory. Nothing here
//! survives a restart.

use crate::models::{Category, TurnReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_id: Uuid,
    pub conversation_id: Uuid,
    pub category: Option<Category>,
    pub outcome: String,
    pub trace: Vec<String>,
    /// SHA-256 of the response text, hex encoded
    pub response_digest: Option<String>,
    pub elapsed_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl TurnRecord {
    pub fn from_report(report: &TurnReport) -> Self {
        Self {
            turn_id: report.turn_id,
            conversation_id: report.conversation_id,
            category: report.outcome.category(),
            outcome: report.outcome.kind().to_string(),
            trace: report.trace.clone(),
            response_digest: report.outcome.response_text().map(compute_response_digest),
            elapsed_ms: report.elapsed_ms,
            created_at: Utc::now(),
        }
    }
}

/// Turns kept when no capacity is configured
pub const DEFAULT_TURN_LOG_CAPACITY: usize = 10_000;

#[derive(Default)]
struct LogInner {
    records: HashMap<Uuid, TurnRecord>,
    /// Insertion order, oldest at the front
    order: VecDeque<Uuid>,
}

/// Audit trail storage, bounded to the most recent `capacity` turns
#[derive(Clone)]
pub struct TurnLog {
    inner: Arc<RwLock<LogInner>>,
    capacity: usize,
}

impl Default for TurnLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TURN_LOG_CAPACITY)
    }
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of zero is treated as one
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LogInner::default())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store a record, evicting the oldest turns past capacity
    pub async fn record(&self, record: TurnRecord) -> Uuid {
        let turn_id = record.turn_id;
        let mut inner = self.inner.write().await;

        if inner.records.insert(turn_id, record).is_none() {
            inner.order.push_back(turn_id);
        }

        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.records.remove(&evicted);
                debug!(turn_id = %evicted, "Evicted turn from audit log");
            }
        }

        turn_id
    }

    pub async fn get(&self, turn_id: Uuid) -> Option<TurnRecord> {
        self.inner.read().await.records.get(&turn_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    /// Turn ids for a conversation, oldest first
    pub async fn list_for_conversation(&self, conversation_id: Uuid) -> Vec<Uuid> {
        let inner = self.inner.read().await;

        inner
            .order
            .iter()
            .filter(|id| {
                inner
                    .records
                    .get(id)
                    .is_some_and(|record| record.conversation_id == conversation_id)
            })
            .copied()
            .collect()
    }

    /// Check that `response_text` is what the turn returned
    pub async fn verify_response(&self, turn_id: Uuid, response_text: &str) -> bool {
        match self.inner.read().await.records.get(&turn_id) {
            Some(record) => {
                record.response_digest.as_deref() == Some(&compute_response_digest(response_text))
            }
            None => false,
        }
    }
}

pub fn compute_response_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
