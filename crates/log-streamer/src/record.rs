// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

/// A single entry bound for the stream: an opaque payload and the key that
/// routes it to a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    data: Vec<u8>,
    partition_key: Arc<str>,
}

impl Record {
    #[must_use]
    pub fn new(data: Vec<u8>, partition_key: Arc<str>) -> Self {
        Record {
            data,
            partition_key,
        }
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
