// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Maximum number of records in a single bulk-put call. Also the capacity of
/// the queue between the feeder and the flusher.
pub const MAX_BATCH_RECORDS: usize = 5;

/// Size of each read from the input source.
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// JSON key used for line payloads when no `--output-key` is given.
pub const DEFAULT_OUTPUT_KEY: &str = "LogEntry";

/// Timeout applied to every metadata endpoint request.
pub const METADATA_TIMEOUT: Duration = Duration::from_millis(500);

pub const ECS_METADATA_V4_ENV: &str = "ECS_CONTAINER_METADATA_URI_V4";
pub const ECS_METADATA_V3_ENV: &str = "ECS_CONTAINER_METADATA_URI";
pub const ECS_METADATA_V2_URL: &str = "http://169.254.170.2/v2/metadata";
pub const EC2_METADATA_ENDPOINT: &str = "http://169.254.169.254";
pub const EC2_METADATA_PATH: &str = "/2019-10-01/meta-data/";
pub const EC2_TOKEN_PATH: &str = "/latest/api/token";
pub const EC2_TOKEN_TTL_SECONDS: &str = "60";

pub const IP_ADDRESS_PREFIX: &str = "ip-address:";
pub const RANDOM_ID_PREFIX: &str = "uuid:";
