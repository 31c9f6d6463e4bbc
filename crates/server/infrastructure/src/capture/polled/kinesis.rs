//! Kinesis stream client
//!
//! [`StreamClient`] backed by `aws-sdk-kinesis`. Credentials and endpoint come
//! from the standard AWS provider chain.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_kinesis::types::ShardIteratorType;
use aws_sdk_kinesis::Client;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::client::{IteratorStart, RecordBatch, StreamClient, StreamClientError, StreamRecord};

#[derive(Debug, Clone)]
pub struct KinesisStreamClient {
    client: Client,
}

impl KinesisStreamClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client for `region` from the environment's AWS configuration.
    pub async fn from_region(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        debug!(region, "Kinesis client configured");
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl StreamClient for KinesisStreamClient {
    async fn list_shards(&self, stream: &str) -> Result<Vec<String>, StreamClientError> {
        let output = self
            .client
            .list_shards()
            .stream_name(stream)
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_resource_not_found_exception() {
                    StreamClientError::StreamNotFound(stream.to_string())
                } else {
                    StreamClientError::Service(e.to_string())
                }
            })?;

        Ok(output
            .shards()
            .iter()
            .map(|shard| shard.shard_id().to_string())
            .collect())
    }

    async fn shard_iterator(
        &self,
        stream: &str,
        shard_id: &str,
        start: &IteratorStart,
    ) -> Result<String, StreamClientError> {
        let request = self
            .client
            .get_shard_iterator()
            .stream_name(stream)
            .shard_id(shard_id);

        let request = match start {
            IteratorStart::Latest => request.shard_iterator_type(ShardIteratorType::Latest),
            IteratorStart::AfterSequenceNumber(seq) => request
                .shard_iterator_type(ShardIteratorType::AfterSequenceNumber)
                .starting_sequence_number(seq),
        };

        let output = request.send().await.map_err(|e| {
            let e = e.into_service_error();
            if e.is_resource_not_found_exception() {
                StreamClientError::StreamNotFound(stream.to_string())
            } else if e.is_provisioned_throughput_exceeded_exception() {
                StreamClientError::Throttled(e.to_string())
            } else {
                StreamClientError::Service(e.to_string())
            }
        })?;

        output
            .shard_iterator()
            .map(str::to_string)
            .ok_or_else(|| StreamClientError::Service("no shard iterator returned".to_string()))
    }

    async fn get_records(
        &self,
        iterator: &str,
        limit: Option<i32>,
    ) -> Result<RecordBatch, StreamClientError> {
        let output = self
            .client
            .get_records()
            .shard_iterator(iterator)
            .set_limit(limit)
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_expired_iterator_exception() {
                    StreamClientError::ExpiredIterator
                } else if e.is_provisioned_throughput_exceeded_exception() {
                    StreamClientError::Throttled(e.to_string())
                } else {
                    StreamClientError::Service(e.to_string())
                }
            })?;

        let records = output
            .records()
            .iter()
            .map(|record| StreamRecord {
                sequence_number: record.sequence_number().to_string(),
                data: record.data().as_ref().to_vec(),
                approximate_arrival: record
                    .approximate_arrival_timestamp()
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos())),
            })
            .collect();

        Ok(RecordBatch {
            records,
            next_iterator: output.next_shard_iterator().map(str::to_string),
            millis_behind_latest: output.millis_behind_latest(),
        })
    }
}
