// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod cli;

use clap::{error::ErrorKind, CommandFactory, Parser};
use std::{env, process::ExitCode, sync::Arc};
use tracing::{debug, error, warn};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use log_streamer::{
    errors::HostIdError,
    framer::Framer,
    host_id::{HostId, HostIdResolver},
    kinesis::KinesisStreamClient,
    logger::{Formatter, LOG_PREFIX},
    sink::StreamSink,
    streamer::Streamer,
};

use cli::Args;

const LOG_LEVEL_ENV: &str = "KINESIS_LOG_STREAMER_LOG_LEVEL";
const DEPENDENCY_FILTER: &str =
    "h2=off,hyper=off,hyper_util=off,rustls=off,aws_smithy_runtime=warn,aws_config=warn,aws_sdk_kinesis=warn";

const EXIT_READ_FAILURE: u8 = 1;
const EXIT_NO_HOST_ID: u8 = 3;

#[tokio::main]
pub async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => Args::command().error(ErrorKind::ValueValidation, e).exit(),
    };
    debug!(
        "Streaming {} input to {} as {:?}",
        config.input_format, config.stream_name, config.payload_format
    );

    let host_id = match resolve_host_id().await {
        Ok(host_id) => host_id,
        Err(code) => return code,
    };
    debug!("Using partition key {host_id}");

    let client = Arc::new(
        KinesisStreamClient::from_env(config.region.clone(), config.profile.clone()).await,
    );
    let sink = Arc::new(StreamSink::new(client, config.stream_name.clone()));
    let streamer = Streamer::new(Framer::from_config(&config), host_id.partition_key(), sink);

    match streamer.run(tokio::io::stdin()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to read from stdin: {e}");
            ExitCode::from(EXIT_READ_FAILURE)
        }
    }
}

async fn resolve_host_id() -> Result<HostId, ExitCode> {
    let resolver = HostIdResolver::from_env().map_err(|e| {
        error!("{e}");
        ExitCode::from(EXIT_NO_HOST_ID)
    })?;

    match resolver.resolve().await {
        Ok(host_id) => Ok(host_id),
        Err(HostIdError::Exhausted(failures)) => {
            for failure in &failures {
                error!("{failure}");
            }
            error!("Unable to obtain a valid host ID");
            Err(ExitCode::from(EXIT_NO_HOST_ID))
        }
        Err(e) => {
            error!("{e}");
            Err(ExitCode::from(EXIT_NO_HOST_ID))
        }
    }
}

fn init_logging() {
    let (level, invalid) = match env::var(LOG_LEVEL_ENV) {
        Ok(value) => match value.trim().parse::<LevelFilter>() {
            Ok(level) => (level, None),
            Err(_) => (LevelFilter::INFO, Some(value)),
        },
        Err(_) => (LevelFilter::INFO, None),
    };

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new(format!("{DEPENDENCY_FILTER},{level}")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .event_format(Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("{LOG_PREFIX} | ERROR | Unable to install the log subscriber: {e}");
        return;
    }

    if let Some(value) = invalid {
        warn!("Invalid {LOG_LEVEL_ENV} value {value:?}, using info");
    }
}
