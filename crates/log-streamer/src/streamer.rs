// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::ErrorKind;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::{self, Sender};
use tracing::{debug, error};

use crate::constants::{MAX_BATCH_RECORDS, READ_CHUNK_SIZE};
use crate::errors::StreamerError;
use crate::flusher::BatchFlusher;
use crate::framer::Framer;
use crate::record::Record;
use crate::sink::SinkWriter;

/// Feeds framed payloads from a reader into a [`BatchFlusher`].
pub struct Streamer<S: ?Sized> {
    framer: Framer,
    partition_key: Arc<str>,
    sink: Arc<S>,
}

impl<S: SinkWriter + ?Sized + 'static> Streamer<S> {
    pub fn new(framer: Framer, partition_key: Arc<str>, sink: Arc<S>) -> Self {
        Streamer {
            framer,
            partition_key,
            sink,
        }
    }

    /// Streams `reader` to the sink until end of input.
    ///
    /// Every record queued before a read or decode failure is still flushed;
    /// the failure is returned once the flusher has drained. A flusher that
    /// dies early is reported as [`StreamerError::FlusherClosed`].
    pub async fn run<R>(mut self, mut reader: R) -> Result<(), StreamerError>
    where
        R: AsyncRead + Unpin,
    {
        let (tx, rx) = mpsc::channel(MAX_BATCH_RECORDS);
        let flusher = tokio::spawn(BatchFlusher::new(Arc::clone(&self.sink), rx).run());

        let result = self.feed(&mut reader, &tx).await;
        drop(tx);

        match flusher.await {
            Ok(batches) => {
                debug!("Input drained, {batches} batches flushed");
                result
            }
            Err(e) => {
                error!("Flusher task failed: {e}");
                result.and(Err(StreamerError::FlusherClosed))
            }
        }
    }

    async fn feed<R>(&mut self, reader: &mut R, tx: &Sender<Record>) -> Result<(), StreamerError>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        let mut payloads = Vec::new();

        loop {
            let n = match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            let framed = self.framer.push_chunk(&chunk[..n], &mut payloads);
            self.enqueue(&mut payloads, tx).await?;
            framed?;
        }

        let framed = self.framer.finish(&mut payloads);
        self.enqueue(&mut payloads, tx).await?;
        framed?;
        Ok(())
    }

    async fn enqueue(
        &self,
        payloads: &mut Vec<Vec<u8>>,
        tx: &Sender<Record>,
    ) -> Result<(), StreamerError> {
        for data in payloads.drain(..) {
            let record = Record::new(data, Arc::clone(&self.partition_key));
            tx.send(record)
                .await
                .map_err(|_| StreamerError::FlusherClosed)?;
        }
        Ok(())
    }
}
