//! LogReplicationSource - outbox changes from a logical replication slot
//!
//! Transactions are peeked from the slot and handed out as change records
//! tagged with the transaction LSN. The slot only advances past a
//! transaction once every one of its records has been acknowledged, so a
//! crash redelivers whatever was not fully processed.

use async_trait::async_trait;
use outbox_relay_domain::capture::{
    CaptureError, ChangeBatch, ChangeCaptureSource, Cursor, Lsn, Position,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::slot::{ReplicationError, ReplicationSlot, WalMessage};
use super::wal2json::decode_transaction;
use super::{AckMode, ReplicationConfig};

fn fatal(e: ReplicationError) -> CaptureError {
    CaptureError::Fatal(e.to_string())
}

/// [`ChangeCaptureSource`] over a [`ReplicationSlot`]
pub struct LogReplicationSource {
    slot: Arc<dyn ReplicationSlot>,
    ack_mode: AckMode,
    batch_size: i32,
    cursor: Cursor,
    /// Records handed out but not yet acknowledged, per transaction
    outstanding: BTreeMap<Lsn, usize>,
    /// Highest transaction handed out
    delivered_upto: Option<Lsn>,
    /// Highest position whose transactions are fully acknowledged
    completed_upto: Option<Lsn>,
    /// Position last confirmed to the slot
    confirmed: Lsn,
    last_flush: Instant,
}

impl LogReplicationSource {
    pub fn new(slot: Arc<dyn ReplicationSlot>, config: &ReplicationConfig) -> Self {
        Self {
            slot,
            ack_mode: config.ack_mode(),
            batch_size: config.batch_size.max(1),
            cursor: Cursor::new(),
            outstanding: BTreeMap::new(),
            delivered_upto: None,
            completed_upto: None,
            confirmed: Lsn::ZERO,
            last_flush: Instant::now(),
        }
    }

    fn flush_due(&self) -> bool {
        match self.ack_mode {
            AckMode::PerRecord => true,
            AckMode::Periodic(interval) => self.last_flush.elapsed() >= interval,
        }
    }

    /// Confirm completed progress to the slot, if any is pending and a flush
    /// is due (or `force`).
    async fn flush(&mut self, force: bool) -> Result<(), CaptureError> {
        let Some(upto) = self.completed_upto.filter(|lsn| *lsn > self.confirmed) else {
            return Ok(());
        };
        if !force && !self.flush_due() {
            return Ok(());
        }

        self.slot.advance(upto).await.map_err(fatal)?;
        self.cursor.advance(Position::Lsn(upto))?;
        self.confirmed = upto;
        self.last_flush = Instant::now();
        debug!(slot = self.slot.slot_name(), lsn = %upto, "Confirmed replication position");
        Ok(())
    }

    /// Mark everything up to `lsn` delivered, unless records of an earlier
    /// transaction are still outstanding.
    fn complete_upto(&mut self, lsn: Lsn) {
        let blocked = self
            .outstanding
            .keys()
            .next()
            .is_some_and(|first| *first <= lsn);
        if blocked {
            return;
        }
        if self.completed_upto.map_or(true, |done| lsn > done) {
            self.completed_upto = Some(lsn);
        }
    }

    /// Peek the slot and drop transactions already handed out. The flag is
    /// set when the peek filled the whole window.
    async fn peek_new(&mut self) -> Result<(Vec<WalMessage>, bool), CaptureError> {
        let messages = self.slot.peek(self.batch_size).await.map_err(fatal)?;
        let window_full = messages.len() >= self.batch_size as usize;
        let fresh = messages
            .into_iter()
            .filter(|m| self.delivered_upto.map_or(true, |done| m.lsn > done))
            .collect();
        Ok((fresh, window_full))
    }
}

#[async_trait]
impl ChangeCaptureSource for LogReplicationSource {
    fn kind(&self) -> &'static str {
        "log-replication"
    }

    async fn start(&mut self) -> Result<(), CaptureError> {
        let setup = |e: ReplicationError| CaptureError::Setup(e.to_string());
        self.slot.ensure_slot().await.map_err(setup)?;
        self.slot.ensure_publication().await.map_err(setup)?;
        let confirmed = self.slot.confirmed_position().await.map_err(setup)?;

        self.cursor.anchor(Position::Lsn(confirmed));
        self.confirmed = confirmed;
        self.last_flush = Instant::now();
        info!(
            slot = self.slot.slot_name(),
            confirmed = %confirmed,
            ack_mode = ?self.ack_mode,
            "Replication source started"
        );
        Ok(())
    }

    async fn fetch(&mut self) -> Result<ChangeBatch, CaptureError> {
        self.flush(false).await?;

        let (mut messages, window_full) = self.peek_new().await?;
        if messages.is_empty() && window_full {
            // A full window of delivered transactions hides anything newer;
            // confirm them so the slot moves on.
            self.flush(true).await?;
            messages = self.peek_new().await?.0;
        }

        let mut records = Vec::new();
        for message in &messages {
            let decoded = decode_transaction(message).map_err(fatal)?;
            if !decoded.is_empty() {
                *self.outstanding.entry(message.lsn).or_default() += decoded.len();
            }
            records.extend(decoded);
            self.delivered_upto = Some(message.lsn);
        }

        let resume_from = messages.last().map(|m| Position::Lsn(m.lsn));
        Ok(ChangeBatch::new(records, resume_from))
    }

    async fn acknowledge(&mut self, position: &Position) -> Result<(), CaptureError> {
        let Position::Lsn(lsn) = position else {
            return Err(CaptureError::Fatal(format!(
                "replication source cannot acknowledge {}",
                position
            )));
        };

        if let Some(remaining) = self.outstanding.get_mut(lsn) {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.outstanding.remove(lsn);
            }
        }
        if !self.outstanding.contains_key(lsn) {
            self.complete_upto(*lsn);
        }

        self.flush(false).await
    }

    async fn close(&mut self) -> Result<(), CaptureError> {
        let result = self.flush(true).await;
        if !self.outstanding.is_empty() {
            warn!(
                slot = self.slot.slot_name(),
                transactions = self.outstanding.len(),
                "Closing with unacknowledged transactions; they will be redelivered"
            );
        }
        info!(slot = self.slot.slot_name(), confirmed = %self.confirmed, "Replication source closed");
        result
    }

    fn cursor(&self) -> &Cursor {
        &self.cursor
    }
}
