//! PolledStreamSource - reads outbox changes from a sharded stream
//!
//! Reads the first shard of the stream from `LATEST`. Records written while
//! the relay was down are never seen; this is the lossy side of the polled
//! strategy and is why it keeps no durable cursor.

use async_trait::async_trait;
use outbox_relay_domain::capture::{
    CaptureError, ChangeBatch, ChangeCaptureSource, Cursor, Position,
};
use outbox_relay_domain::processing::ErrorSink;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::client::{IteratorStart, StreamClient, StreamClientError};
use super::decode::decode_stream_record;
use super::StreamConfig;

/// [`ChangeCaptureSource`] over a [`StreamClient`]
pub struct PolledStreamSource {
    client: Arc<dyn StreamClient>,
    stream_name: String,
    outbox_table: String,
    batch_limit: Option<i32>,
    shard_id: Option<String>,
    iterator: Option<String>,
    last_sequence: Option<String>,
    shard_closed: bool,
    cursor: Cursor,
    errors: Option<Arc<dyn ErrorSink>>,
}

impl PolledStreamSource {
    pub fn new(client: Arc<dyn StreamClient>, config: &StreamConfig, outbox_table: &str) -> Self {
        Self {
            client,
            stream_name: config.name.clone(),
            outbox_table: outbox_table.to_string(),
            batch_limit: config.batch_limit,
            shard_id: None,
            iterator: None,
            last_sequence: None,
            shard_closed: false,
            cursor: Cursor::new(),
            errors: None,
        }
    }

    /// Report undecodable stream records to `errors` instead of only logging them.
    pub fn with_error_sink(mut self, errors: Arc<dyn ErrorSink>) -> Self {
        self.errors = Some(errors);
        self
    }

    fn shard(&self) -> Result<&str, CaptureError> {
        self.shard_id
            .as_deref()
            .ok_or_else(|| CaptureError::Fatal("polled source used before start".to_string()))
    }

    /// Replace an expired iterator, resuming right after the last delivered record.
    async fn reanchor(&mut self) -> Result<(), CaptureError> {
        let start = match &self.last_sequence {
            Some(seq) => IteratorStart::AfterSequenceNumber(seq.clone()),
            None => IteratorStart::Latest,
        };
        let shard = self.shard()?.to_string();
        let iterator = self
            .client
            .shard_iterator(&self.stream_name, &shard, &start)
            .await
            .map_err(|e| CaptureError::Transient(format!("re-anchoring shard iterator: {}", e)))?;

        info!(stream = %self.stream_name, shard = %shard, start = ?start, "Shard iterator re-anchored");
        self.cursor.anchor(Position::ShardIterator(iterator.clone()));
        self.iterator = Some(iterator);
        Ok(())
    }
}

#[async_trait]
impl ChangeCaptureSource for PolledStreamSource {
    fn kind(&self) -> &'static str {
        "polled-stream"
    }

    async fn start(&mut self) -> Result<(), CaptureError> {
        let shards = self
            .client
            .list_shards(&self.stream_name)
            .await
            .map_err(|e| CaptureError::Setup(e.to_string()))?;
        let shard = shards.into_iter().next().ok_or_else(|| {
            CaptureError::Setup(format!("stream {} has no shards", self.stream_name))
        })?;

        let iterator = self
            .client
            .shard_iterator(&self.stream_name, &shard, &IteratorStart::Latest)
            .await
            .map_err(|e| CaptureError::Setup(e.to_string()))?;

        info!(stream = %self.stream_name, shard = %shard, "Consuming stream from LATEST");
        self.cursor.anchor(Position::ShardIterator(iterator.clone()));
        self.shard_id = Some(shard);
        self.iterator = Some(iterator);
        Ok(())
    }

    async fn fetch(&mut self) -> Result<ChangeBatch, CaptureError> {
        if self.shard_closed {
            return Err(CaptureError::Fatal(format!(
                "shard {} of stream {} is closed",
                self.shard_id.as_deref().unwrap_or("?"),
                self.stream_name
            )));
        }
        let iterator = self
            .iterator
            .clone()
            .ok_or_else(|| CaptureError::Fatal("polled source used before start".to_string()))?;

        let batch = match self.client.get_records(&iterator, self.batch_limit).await {
            Ok(batch) => batch,
            Err(StreamClientError::ExpiredIterator) => {
                self.reanchor().await?;
                return Err(CaptureError::Transient("shard iterator expired".to_string()));
            }
            Err(e) => return Err(CaptureError::Transient(e.to_string())),
        };

        if let Some(lag) = batch.millis_behind_latest.filter(|lag| *lag > 0) {
            debug!(stream = %self.stream_name, millis_behind_latest = lag, "Stream lag");
        }

        let mut records = Vec::with_capacity(batch.records.len());
        for raw in &batch.records {
            match decode_stream_record(raw, &self.outbox_table) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        sequence_number = %raw.sequence_number,
                        error = %e,
                        "Skipping undecodable stream record"
                    );
                    if let Some(errors) = &self.errors {
                        let context = format!("Error decoding stream record {}", raw.sequence_number);
                        errors.record(&context, &e).await;
                    }
                }
            }
        }

        if batch.next_iterator.is_none() {
            self.shard_closed = true;
        }

        Ok(ChangeBatch::new(
            records,
            batch.next_iterator.map(Position::ShardIterator),
        ))
    }

    async fn acknowledge(&mut self, position: &Position) -> Result<(), CaptureError> {
        match position {
            Position::SequenceNumber(seq) => {
                self.cursor.advance(position.clone())?;
                self.last_sequence = Some(seq.clone());
            }
            Position::ShardIterator(next) => {
                self.cursor.advance(position.clone())?;
                self.iterator = Some(next.clone());
            }
            Position::Lsn(lsn) => {
                return Err(CaptureError::Fatal(format!(
                    "polled source cannot acknowledge LSN {}",
                    lsn
                )))
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CaptureError> {
        info!(
            stream = %self.stream_name,
            last_sequence = self.last_sequence.as_deref().unwrap_or("-"),
            "Polled stream source closed"
        );
        self.iterator = None;
        Ok(())
    }

    fn cursor(&self) -> &Cursor {
        &self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::polled::client::{RecordBatch, StreamRecord};
    use outbox_relay_domain::capture::ChangeOperation;
    use outbox_relay_domain::testing::RecordingErrorSink;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Stream client that replays scripted reads and records the calls it got
    #[derive(Default)]
    struct FakeStreamClient {
        shards: Vec<String>,
        reads: Mutex<VecDeque<Result<RecordBatch, StreamClientError>>>,
        iterator_requests: Mutex<Vec<IteratorStart>>,
        read_iterators: Mutex<Vec<String>>,
    }

    impl FakeStreamClient {
        fn with_reads(reads: Vec<Result<RecordBatch, StreamClientError>>) -> Self {
            Self {
                shards: vec!["shardId-000".into(), "shardId-001".into()],
                reads: Mutex::new(reads.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl StreamClient for FakeStreamClient {
        async fn list_shards(&self, stream: &str) -> Result<Vec<String>, StreamClientError> {
            if stream == "missing" {
                return Err(StreamClientError::StreamNotFound(stream.into()));
            }
            Ok(self.shards.clone())
        }

        async fn shard_iterator(
            &self,
            _stream: &str,
            shard_id: &str,
            start: &IteratorStart,
        ) -> Result<String, StreamClientError> {
            let mut requests = self.iterator_requests.lock().unwrap();
            requests.push(start.clone());
            Ok(format!("{}-it-{}", shard_id, requests.len()))
        }

        async fn get_records(
            &self,
            iterator: &str,
            _limit: Option<i32>,
        ) -> Result<RecordBatch, StreamClientError> {
            self.read_iterators.lock().unwrap().push(iterator.to_string());
            self.reads
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RecordBatch {
                    records: vec![],
                    next_iterator: Some(iterator.to_string()),
                    millis_behind_latest: None,
                }))
        }
    }

    fn dms_record(seq: &str, id: i32) -> StreamRecord {
        let payload = json!({
            "data": {
                "id": id,
                "message": {
                    "event_type": "INSERT",
                    "table_name": "people",
                    "data": {"id": id},
                    "timestamp": 1_700_000_000
                },
                "status": "pending"
            },
            "metadata": {"record-type": "data", "operation": "insert", "table-name": "outbox"}
        });
        StreamRecord {
            sequence_number: seq.into(),
            data: serde_json::to_vec(&payload).unwrap(),
            approximate_arrival: None,
        }
    }

    fn source(client: Arc<FakeStreamClient>) -> PolledStreamSource {
        let config = StreamConfig {
            name: "outbox-stream".into(),
            ..StreamConfig::default()
        };
        PolledStreamSource::new(client, &config, "outbox")
    }

    #[tokio::test]
    async fn test_start_uses_first_shard_at_latest() {
        let client = Arc::new(FakeStreamClient::with_reads(vec![]));
        let mut source = source(client.clone());
        source.start().await.unwrap();

        assert_eq!(source.shard_id.as_deref(), Some("shardId-000"));
        assert_eq!(*client.iterator_requests.lock().unwrap(), vec![IteratorStart::Latest]);
        assert_eq!(
            source.cursor().position(),
            Some(&Position::ShardIterator("shardId-000-it-1".into()))
        );
    }

    #[tokio::test]
    async fn test_start_fails_on_missing_stream_or_no_shards() {
        let client = Arc::new(FakeStreamClient::with_reads(vec![]));
        let config = StreamConfig {
            name: "missing".into(),
            ..StreamConfig::default()
        };
        let mut missing = PolledStreamSource::new(client, &config, "outbox");
        assert!(matches!(missing.start().await, Err(CaptureError::Setup(_))));

        let empty = Arc::new(FakeStreamClient::default());
        let mut no_shards = source(empty);
        assert!(matches!(no_shards.start().await, Err(CaptureError::Setup(_))));
    }

    #[tokio::test]
    async fn test_next_iterator_applies_only_after_acknowledge() {
        let client = Arc::new(FakeStreamClient::with_reads(vec![Ok(RecordBatch {
            records: vec![dms_record("100", 1), dms_record("101", 2)],
            next_iterator: Some("next-1".into()),
            millis_behind_latest: Some(0),
        })]));
        let mut source = source(client.clone());
        source.start().await.unwrap();

        let batch = source.fetch().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records[0].operation, ChangeOperation::Insert);
        assert_eq!(batch.records[1].position, Position::SequenceNumber("101".into()));
        assert_eq!(batch.resume_from, Some(Position::ShardIterator("next-1".into())));

        // not yet acknowledged: the same iterator is read again
        source.fetch().await.unwrap();
        for record in &batch.records {
            source.acknowledge(&record.position).await.unwrap();
        }
        source.acknowledge(batch.resume_from.as_ref().unwrap()).await.unwrap();
        source.fetch().await.unwrap();

        let reads = client.read_iterators.lock().unwrap().clone();
        assert_eq!(reads, vec!["shardId-000-it-1", "shardId-000-it-1", "next-1"]);
        assert_eq!(source.last_sequence.as_deref(), Some("101"));
    }

    #[tokio::test]
    async fn test_sequence_regression_is_rejected() {
        let client = Arc::new(FakeStreamClient::with_reads(vec![]));
        let mut source = source(client);
        source.start().await.unwrap();

        source
            .acknowledge(&Position::SequenceNumber("200".into()))
            .await
            .unwrap();
        let err = source
            .acknowledge(&Position::SequenceNumber("150".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Cursor(_)));
    }

    #[tokio::test]
    async fn test_transient_and_expired_iterator() {
        let client = Arc::new(FakeStreamClient::with_reads(vec![
            Err(StreamClientError::Throttled("slow down".into())),
            Err(StreamClientError::ExpiredIterator),
        ]));
        let mut source = source(client.clone());
        source.start().await.unwrap();
        source
            .acknowledge(&Position::SequenceNumber("42".into()))
            .await
            .unwrap();

        assert!(source.fetch().await.unwrap_err().is_transient());
        assert!(source.fetch().await.unwrap_err().is_transient());

        assert_eq!(
            *client.iterator_requests.lock().unwrap(),
            vec![
                IteratorStart::Latest,
                IteratorStart::AfterSequenceNumber("42".into())
            ]
        );
        assert_eq!(source.iterator.as_deref(), Some("shardId-000-it-2"));
    }

    #[tokio::test]
    async fn test_closed_shard_is_fatal_after_final_batch() {
        let client = Arc::new(FakeStreamClient::with_reads(vec![Ok(RecordBatch {
            records: vec![dms_record("9", 1)],
            next_iterator: None,
            millis_behind_latest: None,
        })]));
        let mut source = source(client);
        source.start().await.unwrap();

        let last = source.fetch().await.unwrap();
        assert_eq!(last.len(), 1);
        assert!(last.resume_from.is_none());

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, CaptureError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_undecodable_records_are_reported_and_skipped() {
        let garbage = StreamRecord {
            sequence_number: "5".into(),
            data: b"not json".to_vec(),
            approximate_arrival: None,
        };
        let client = Arc::new(FakeStreamClient::with_reads(vec![Ok(RecordBatch {
            records: vec![garbage, dms_record("6", 3)],
            next_iterator: Some("n".into()),
            millis_behind_latest: None,
        })]));
        let errors = Arc::new(RecordingErrorSink::new());
        let mut source = source(client).with_error_sink(errors.clone());
        source.start().await.unwrap();

        let batch = source.fetch().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records[0].message_id(), Some(3));

        let recorded = errors.entries().await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].context, "Error decoding stream record 5");
    }

    #[tokio::test]
    async fn test_lsn_positions_are_rejected() {
        let client = Arc::new(FakeStreamClient::with_reads(vec![]));
        let mut source = source(client);
        let err = source
            .acknowledge(&Position::Lsn(outbox_relay_domain::capture::Lsn::new(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Fatal(_)));
    }
}
