// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use log_streamer::{
    config::{InputFormat, OutputFormat, StreamerConfig},
    errors::{SinkError, StreamerError},
    framer::Framer,
    host_id::{HostIdResolver, IdentitySource},
    record::Record,
    sink::{PutRecordResult, PutRecordsResponse, StreamClient, StreamSink},
    streamer::Streamer,
};
use mockito::Server;
use std::sync::{Arc, Mutex};

/// Accepts every record and keeps what it was sent, one entry per call.
#[derive(Default)]
struct InMemoryStream {
    calls: Mutex<Vec<Vec<Record>>>,
    fail_first_call: bool,
}

impl InMemoryStream {
    fn payloads(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|r| String::from_utf8(r.data().to_vec()).unwrap())
            .collect()
    }

    fn call_sizes(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl StreamClient for InMemoryStream {
    async fn put_records(
        &self,
        stream_name: &str,
        records: &[Record],
    ) -> Result<PutRecordsResponse, SinkError> {
        assert_eq!(stream_name, "Apache");
        let mut calls = self.calls.lock().unwrap();
        calls.push(records.to_vec());
        if self.fail_first_call && calls.len() == 1 {
            return Err(SinkError::Transport("connection reset".to_string()));
        }
        Ok(PutRecordsResponse {
            failed_record_count: 0,
            records: vec![PutRecordResult::default(); records.len()],
        })
    }
}

fn config(input: InputFormat, output: OutputFormat, entries: &[(&str, &str)]) -> StreamerConfig {
    StreamerConfig::new(
        "Apache".to_string(),
        input,
        output,
        None,
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
    .unwrap()
}

async fn stream(
    config: &StreamerConfig,
    client: &Arc<InMemoryStream>,
    partition_key: &str,
    input: &[u8],
) -> Result<(), StreamerError> {
    let sink = Arc::new(StreamSink::new(
        Arc::clone(client),
        config.stream_name.clone(),
    ));
    Streamer::new(Framer::from_config(config), Arc::from(partition_key), sink)
        .run(input)
        .await
}

#[tokio::test]
async fn error_log_lines_become_json_records() {
    let client = Arc::new(InMemoryStream::default());
    let config = config(
        InputFormat::Line,
        OutputFormat::Json,
        &[("LogFile", "ErrorLog")],
    );

    let input = b"[error] AH00128: File does not exist\r\n\n[warn] child process exited\nincomplete";
    stream(&config, &client, "uuid:00ff", input).await.unwrap();

    assert_eq!(
        client.payloads(),
        vec![
            r#"{"LogEntry":"[error] AH00128: File does not exist","LogFile":"ErrorLog"}"#,
            r#"{"LogEntry":"[warn] child process exited","LogFile":"ErrorLog"}"#,
        ]
    );
}

#[tokio::test]
async fn access_log_json_values_are_normalized() {
    let client = Arc::new(InMemoryStream::default());
    let config = config(
        InputFormat::Json,
        OutputFormat::Auto,
        &[("LogFile", "AccessLog")],
    );

    let input = br#"{"Status": 200, "RequestMethod": "GET"}
{"Status": 404, "RequestMethod": "HEAD"} null "plain" 17
"#;
    stream(&config, &client, "uuid:00ff", input).await.unwrap();

    assert_eq!(
        client.payloads(),
        vec![
            r#"{"RequestMethod":"GET","Status":200}"#,
            r#"{"RequestMethod":"HEAD","Status":404}"#,
            r#""plain""#,
            "17",
        ]
    );
}

#[tokio::test]
async fn failed_batch_does_not_stop_the_stream() {
    let client = Arc::new(InMemoryStream {
        fail_first_call: true,
        ..Default::default()
    });
    let config = config(InputFormat::Line, OutputFormat::Auto, &[]);

    let input: String = (0..12).map(|i| format!("GET /page/{i} 200\n")).collect();
    stream(&config, &client, "uuid:00ff", input.as_bytes())
        .await
        .unwrap();

    assert_eq!(client.call_sizes(), vec![5, 5, 2]);
    assert_eq!(client.payloads().len(), 12);
}

#[tokio::test]
async fn resolved_host_id_keys_every_record() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/task")
        .with_status(200)
        .with_body(r#"{"TaskARN":"arn:aws:ecs:us-east-1:012345678910:task/web/5f2c"}"#)
        .create_async()
        .await;

    let resolver = HostIdResolver::with_sources(vec![
        IdentitySource::EcsTaskMetadata {
            version: 4,
            url: format!("{}/task", server.url()),
            configured: true,
        },
        IdentitySource::Random,
    ])
    .unwrap();
    let host_id = resolver.resolve().await.unwrap();

    let client = Arc::new(InMemoryStream::default());
    let config = config(InputFormat::Line, OutputFormat::String, &[]);
    stream(&config, &client, host_id.as_str(), b"one\ntwo\n")
        .await
        .unwrap();

    let calls = client.calls.lock().unwrap();
    assert!(calls
        .iter()
        .flatten()
        .all(|r| r.partition_key() == "arn:aws:ecs:us-east-1:012345678910:task/web/5f2c"));
}
