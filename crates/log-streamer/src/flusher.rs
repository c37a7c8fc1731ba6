// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The batching worker.
//!
//! The flusher owns the receiving side of the bounded record queue and keeps a
//! local pending list separate from it:
//!
//! ```text
//!   pending empty  ──> recv().await        (wait for a record or close)
//!   pending > 0    ──> try_recv()
//!                       ├─ record  ──> append, flush at MAX_BATCH_RECORDS
//!                       ├─ empty   ──> flush now (producer is idle)
//!                       └─ closed  ──> flush and stop
//! ```
//!
//! There is no timer: a batch leaves as soon as it is full or the producer
//! has nothing more ready.

use std::sync::Arc;
use tokio::sync::mpsc::{error::TryRecvError, Receiver};
use tracing::debug;

use crate::constants::MAX_BATCH_RECORDS;
use crate::record::Record;
use crate::sink::SinkWriter;

pub struct BatchFlusher<S: ?Sized> {
    sink: Arc<S>,
    rx: Receiver<Record>,
    pending: Vec<Record>,
}

impl<S: SinkWriter + ?Sized> BatchFlusher<S> {
    pub fn new(sink: Arc<S>, rx: Receiver<Record>) -> Self {
        BatchFlusher {
            sink,
            rx,
            pending: Vec::with_capacity(MAX_BATCH_RECORDS),
        }
    }

    /// Runs until the queue is closed and drained. Returns the number of
    /// batches handed to the sink.
    pub async fn run(mut self) -> usize {
        let mut flushed = 0;

        loop {
            if self.pending.is_empty() {
                match self.rx.recv().await {
                    Some(record) => self.pending.push(record),
                    None => break,
                }
                continue;
            }

            match self.rx.try_recv() {
                Ok(record) => {
                    self.pending.push(record);
                    if self.pending.len() >= MAX_BATCH_RECORDS {
                        self.flush().await;
                        flushed += 1;
                    }
                }
                Err(TryRecvError::Empty) => {
                    self.flush().await;
                    flushed += 1;
                }
                Err(TryRecvError::Disconnected) => {
                    self.flush().await;
                    flushed += 1;
                    break;
                }
            }
        }

        debug!("Flusher stopped after {flushed} batches");
        flushed
    }

    async fn flush(&mut self) {
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(MAX_BATCH_RECORDS));
        self.sink.flush(batch).await;
    }
}
