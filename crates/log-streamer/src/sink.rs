// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use crate::errors::SinkError;
use crate::record::Record;

/// Destination for finished batches.
///
/// Implementations report failures themselves; `flush` never returns an
/// error.
#[async_trait]
pub trait SinkWriter: Send + Sync {
    async fn flush(&self, batch: Vec<Record>);
}

/// Result of one entry in a bulk-put response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutRecordResult {
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub shard_id: Option<String>,
}

/// Response of a bulk-put call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutRecordsResponse {
    pub failed_record_count: i32,
    pub records: Vec<PutRecordResult>,
}

/// The remote bulk-put operation.
#[async_trait]
pub trait StreamClient: Send + Sync {
    async fn put_records(
        &self,
        stream_name: &str,
        records: &[Record],
    ) -> Result<PutRecordsResponse, SinkError>;
}

/// Outcome of one attempted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Success,
    Failed {
        reason: String,
        error_code: Option<String>,
        shard_id: Option<String>,
    },
}

impl PutRecordsResponse {
    /// Per-record outcomes. Entries that carry no error message count as
    /// written, even when the response declares failures.
    #[must_use]
    pub fn outcomes(&self) -> Vec<RecordOutcome> {
        if self.failed_record_count <= 0 {
            return vec![RecordOutcome::Success; self.records.len()];
        }
        self.records
            .iter()
            .map(|result| match result.error_message.as_deref() {
                Some(message) if !message.is_empty() => RecordOutcome::Failed {
                    reason: message.to_string(),
                    error_code: result.error_code.clone(),
                    shard_id: result.shard_id.clone().filter(|s| !s.is_empty()),
                },
                _ => RecordOutcome::Success,
            })
            .collect()
    }
}

/// Writes batches to a named stream through a [`StreamClient`].
pub struct StreamSink<C> {
    client: Arc<C>,
    stream_name: String,
}

impl<C: StreamClient> StreamSink<C> {
    pub fn new(client: Arc<C>, stream_name: String) -> Self {
        StreamSink {
            client,
            stream_name,
        }
    }
}

#[async_trait]
impl<C: StreamClient> SinkWriter for StreamSink<C> {
    async fn flush(&self, batch: Vec<Record>) {
        if batch.is_empty() {
            return;
        }
        debug!("Flushing {} records to {}", batch.len(), self.stream_name);

        let response = match self.client.put_records(&self.stream_name, &batch).await {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to call Kinesis.PutRecords: {e}");
                return;
            }
        };

        for outcome in response.outcomes() {
            match outcome {
                RecordOutcome::Success => {}
                RecordOutcome::Failed {
                    reason,
                    shard_id: Some(shard_id),
                    ..
                } => error!("Failed to write a Kinesis record: {reason} (ShardId={shard_id})"),
                RecordOutcome::Failed {
                    reason,
                    shard_id: None,
                    ..
                } => error!("Failed to write a Kinesis record: {reason}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    struct MockClient {
        response: Result<PutRecordsResponse, String>,
        calls: Mutex<Vec<usize>>,
    }

    impl MockClient {
        fn new(response: Result<PutRecordsResponse, String>) -> Arc<Self> {
            Arc::new(MockClient {
                response,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl StreamClient for MockClient {
        async fn put_records(
            &self,
            stream_name: &str,
            records: &[Record],
        ) -> Result<PutRecordsResponse, SinkError> {
            assert_eq!(stream_name, "test-stream");
            self.calls.lock().unwrap().push(records.len());
            self.response.clone().map_err(SinkError::Transport)
        }
    }

    fn batch(n: usize) -> Vec<Record> {
        let key: Arc<str> = Arc::from("uuid:0123");
        (0..n)
            .map(|i| Record::new(format!("line {i}").into_bytes(), Arc::clone(&key)))
            .collect()
    }

    #[tokio::test]
    #[traced_test]
    async fn test_partial_failure_logs_each_failed_record() {
        let mut records = vec![PutRecordResult::default(); 5];
        records[2] = PutRecordResult {
            error_code: Some("ProvisionedThroughputExceededException".to_string()),
            error_message: Some("ProvisionedThroughputExceededException".to_string()),
            shard_id: Some("shardId-1".to_string()),
        };
        let client = MockClient::new(Ok(PutRecordsResponse {
            failed_record_count: 1,
            records,
        }));
        let sink = StreamSink::new(Arc::clone(&client), "test-stream".to_string());

        sink.flush(batch(5)).await;

        assert_eq!(*client.calls.lock().unwrap(), vec![5]);
        assert!(logs_contain(
            "Failed to write a Kinesis record: ProvisionedThroughputExceededException (ShardId=shardId-1)"
        ));
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("Failed to write a Kinesis record"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one failure line, found {n}")),
            }
        });
    }

    #[tokio::test]
    #[traced_test]
    async fn test_transport_failure_logged_once() {
        let client = MockClient::new(Err("dispatch failure: connection refused".to_string()));
        let sink = StreamSink::new(Arc::clone(&client), "test-stream".to_string());

        sink.flush(batch(3)).await;

        assert_eq!(*client.calls.lock().unwrap(), vec![3]);
        assert!(logs_contain(
            "Failed to call Kinesis.PutRecords: dispatch failure: connection refused"
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_success_logs_nothing() {
        let client = MockClient::new(Ok(PutRecordsResponse {
            failed_record_count: 0,
            records: vec![PutRecordResult::default(); 2],
        }));
        let sink = StreamSink::new(Arc::clone(&client), "test-stream".to_string());

        sink.flush(batch(2)).await;

        assert!(!logs_contain("Failed to"));
    }

    #[tokio::test]
    async fn test_empty_batch_not_sent() {
        let client = MockClient::new(Ok(PutRecordsResponse::default()));
        let sink = StreamSink::new(Arc::clone(&client), "test-stream".to_string());

        sink.flush(Vec::new()).await;

        assert!(client.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_entries_without_message_count_as_success() {
        let response = PutRecordsResponse {
            failed_record_count: 2,
            records: vec![
                PutRecordResult {
                    error_code: Some("InternalFailure".to_string()),
                    error_message: None,
                    ..Default::default()
                },
                PutRecordResult {
                    error_message: Some(String::new()),
                    ..Default::default()
                },
                PutRecordResult {
                    error_message: Some("Internal service failure.".to_string()),
                    shard_id: Some(String::new()),
                    ..Default::default()
                },
            ],
        };

        assert_eq!(
            response.outcomes(),
            vec![
                RecordOutcome::Success,
                RecordOutcome::Success,
                RecordOutcome::Failed {
                    reason: "Internal service failure.".to_string(),
                    error_code: None,
                    shard_id: None,
                },
            ]
        );
    }

    #[test]
    fn test_messages_ignored_without_declared_failures() {
        let response = PutRecordsResponse {
            failed_record_count: 0,
            records: vec![PutRecordResult {
                error_message: Some("ignored".to_string()),
                ..Default::default()
            }],
        };
        assert_eq!(response.outcomes(), vec![RecordOutcome::Success]);
    }
}
