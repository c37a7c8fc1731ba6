// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # log-streamer
//!
//! Ships a local log stream to an Amazon Kinesis data stream.
//!
//! ## Overview
//!
//! Bytes read from a producer (typically a web server's piped log) are split
//! into records, accumulated into small batches and handed to a bulk-put call:
//!
//! ```text
//!   stdin ──> Framer ──> bounded queue (5) ──> BatchFlusher ──> SinkWriter ──> Kinesis
//!             (feeder)                          (worker task)
//! ```
//!
//! - [`framer`]: line and JSON-value framing of the raw byte stream
//! - [`flusher`]: the batching worker that decides when a batch goes out
//! - [`streamer`]: wires a framer, the queue and the flusher together
//! - [`sink`]: bulk-put result interpretation and per-record diagnostics
//! - [`kinesis`]: the AWS SDK backed stream client
//! - [`host_id`]: partition key resolution from container/instance metadata

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod errors;
pub mod flusher;
pub mod framer;
pub mod host_id;
pub mod kinesis;
pub mod logger;
pub mod record;
pub mod sink;
pub mod streamer;
