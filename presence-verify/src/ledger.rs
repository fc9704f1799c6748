//! Attendance ledger
//!
//! In-memory store of submitted records for the calling layer. Owns the
//! "already marked today" policy: one record per (user, local date). The
//! verification core itself never deduplicates.

use crate::session::AttendanceRecord;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Attendance already marked for {user_id} on {date}")]
    AlreadyMarked { user_id: String, date: NaiveDate },
}

/// One filed record
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub user_id: String,
    pub date: NaiveDate,
    pub session_id: Uuid,
    pub record: AttendanceRecord,
}

#[derive(Default)]
pub struct AttendanceLedger {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl AttendanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_marked(&self, user_id: &str, date: NaiveDate) -> bool {
        self.entries
            .read()
            .await
            .iter()
            .any(|e| e.user_id == user_id && e.date == date)
    }

    /// Fail fast before a session is opened or submitted
    pub async fn ensure_unmarked(&self, user_id: &str, date: NaiveDate) -> Result<(), LedgerError> {
        if self.is_marked(user_id, date).await {
            return Err(LedgerError::AlreadyMarked {
                user_id: user_id.to_string(),
                date,
            });
        }
        Ok(())
    }

    /// File a record; the check and insert happen under one write lock
    pub async fn file(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        let mut entries = self.entries.write().await;
        if entries
            .iter()
            .any(|e| e.user_id == entry.user_id && e.date == entry.date)
        {
            return Err(LedgerError::AlreadyMarked {
                user_id: entry.user_id,
                date: entry.date,
            });
        }
        info!(user_id = %entry.user_id, date = %entry.date, "Attendance filed");
        entries.push(entry);
        Ok(())
    }

    /// Filed records, oldest first, optionally for one user
    pub async fn list(&self, user_id: Option<&str>) -> Vec<LedgerEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| user_id.map_or(true, |u| e.user_id == u))
            .cloned()
            .collect()
    }
}
