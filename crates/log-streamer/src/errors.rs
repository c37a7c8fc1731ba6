// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Errors that end a streaming run.
#[derive(Debug, thiserror::Error)]
pub enum StreamerError {
    #[error("{0}")]
    Read(#[from] std::io::Error),

    #[error("invalid JSON input: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("flusher stopped before the input was exhausted")]
    FlusherClosed,
}

/// Errors from a single bulk-put call.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{0}")]
    Transport(String),

    #[error("unable to build request entry: {0}")]
    Request(String),
}

/// Errors raised while validating command-line configuration.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Additional entry is missing '=': {0}")]
    MissingSeparator(String),

    #[error("Duplicate key for --add-entry: {0}")]
    DuplicateEntry(String),

    #[error("Kinesis stream must be specified")]
    MissingStreamName,

    #[error("Output key must not be empty")]
    EmptyOutputKey,
}

/// One failed step of the host identity chain.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: String,
    pub reason: anyhow::Error,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to get host ID from {}: {:#}", self.source, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostIdError {
    #[error("Unable to create metadata HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Unable to obtain a valid host ID")]
    Exhausted(Vec<SourceFailure>),
}
