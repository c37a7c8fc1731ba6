// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`StreamClient`] backed by the AWS SDK.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_kinesis::error::DisplayErrorContext;
use aws_sdk_kinesis::operation::put_records::PutRecordsOutput;
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::PutRecordsRequestEntry;
use aws_sdk_kinesis::Client;
use tracing::debug;

use crate::errors::SinkError;
use crate::record::Record;
use crate::sink::{PutRecordResult, PutRecordsResponse, StreamClient};

#[derive(Debug, Clone)]
pub struct KinesisStreamClient {
    client: Client,
}

impl KinesisStreamClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        KinesisStreamClient { client }
    }

    /// Builds a client from the standard AWS configuration chain.
    ///
    /// An explicit `region` overrides `AWS_REGION` and the profile's region;
    /// `profile` selects credentials from the shared config files.
    pub async fn from_env(region: Option<String>, profile: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = profile {
            debug!("Using AWS profile {profile}");
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config))
    }
}

fn request_entry(record: &Record) -> Result<PutRecordsRequestEntry, SinkError> {
    PutRecordsRequestEntry::builder()
        .data(Blob::new(record.data()))
        .partition_key(record.partition_key())
        .build()
        .map_err(|e| SinkError::Request(e.to_string()))
}

fn into_response(output: PutRecordsOutput) -> PutRecordsResponse {
    PutRecordsResponse {
        failed_record_count: output.failed_record_count().unwrap_or_default(),
        records: output
            .records()
            .iter()
            .map(|entry| PutRecordResult {
                error_code: entry.error_code().map(str::to_string),
                error_message: entry.error_message().map(str::to_string),
                shard_id: entry.shard_id().map(str::to_string),
            })
            .collect(),
    }
}

#[async_trait]
impl StreamClient for KinesisStreamClient {
    async fn put_records(
        &self,
        stream_name: &str,
        records: &[Record],
    ) -> Result<PutRecordsResponse, SinkError> {
        let entries = records
            .iter()
            .map(request_entry)
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .put_records()
            .stream_name(stream_name)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|e| SinkError::Transport(DisplayErrorContext(&e).to_string()))?;

        Ok(into_response(output))
    }
}
