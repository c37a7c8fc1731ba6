// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use log_streamer::config::{self, InputFormat, OutputFormat, StreamerConfig};
use log_streamer::constants::DEFAULT_OUTPUT_KEY;
use log_streamer::errors::ConfigError;

const LONG_ABOUT: &str = r#"Stream incoming log entries to a Kinesis stream. This is intended to be used
in an application that supports piping log entries to an external program.
For example, in Apache, the following directives can be used to write
JSON-formatted logs to Kinesis:

    LogFormat "{\
        \"ClientAddress\": \"%a\", \"PeerAddress\": \"%{c}a\", \
        \"Protocol\": \"%H\", \"QueryString\": \"%q\", \
        \"RequestHandler\": \"%R\", \"RequestLine\": \"%r\", \
        \"RequestMethod\": \"%m\", \"RequestTimeMicroseconds\": %D, \
        \"ResponseBodySize\": %B, \"Referer\": \"%{Referer}i\", \
        \"StartTime\": \"%{%Y-%m-%dT%H:%M:%S}t.%{usec_frac}tZ\", \
        \"Status\": %>s, \"User\": \"%u\", \
        \"UserAgent\": \"%{User-agent}i\", \"UrlPath\": \"%U\" \
    }" accessjson
    CustomLog \
        "|/usr/bin/kinesis-log-streamer --format json \
            --add-entry LogFile=AccessLog Apache" accessjson
    ErrorLog \
        "|/usr/bin/kinesis-log-streamer --format line \
            --output-format json --add-entry LogFile=ErrorLog Apache""#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Line,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormatArg {
    Auto,
    Json,
    String,
}

impl From<FormatArg> for InputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Line => InputFormat::Line,
            FormatArg::Json => InputFormat::Json,
        }
    }
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Auto => OutputFormat::Auto,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::String => OutputFormat::String,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "kinesis-log-streamer",
    version,
    about = "Stream incoming log entries to a Kinesis stream",
    long_about = LONG_ABOUT
)]
pub struct Args {
    /// Format of incoming log entries. This determines how the incoming
    /// stream is split into Kinesis records.
    #[arg(short = 'f', long, value_enum, default_value_t = FormatArg::Line, value_name = "INPUT_FORMAT")]
    pub format: FormatArg,

    /// Format of the output. "auto" maps line input to string output and
    /// JSON input to JSON output.
    #[arg(short = 'F', long, value_enum, default_value_t = OutputFormatArg::Auto)]
    pub output_format: OutputFormatArg,

    /// When mapping incoming line entries to JSON output, the JSON key to
    /// output the line under.
    #[arg(short = 'k', long, value_name = "KEY", default_value = DEFAULT_OUTPUT_KEY)]
    pub output_key: String,

    /// Add the specified entry to each JSON output; may be repeated.
    #[arg(short = 'I', long = "add-entry", value_name = "KEY=VALUE", value_parser = parse_add_entry)]
    pub add_entries: Vec<(String, String)>,

    /// The AWS region to use. Defaults to $AWS_REGION or the profile's region.
    #[arg(short, long)]
    pub region: Option<String>,

    /// Obtain AWS credentials from this profile in ~/.aws/credentials.
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Name of the Kinesis stream to write to.
    #[arg(value_name = "STREAM_NAME")]
    pub stream_name: String,
}

fn parse_add_entry(entry: &str) -> Result<(String, String), ConfigError> {
    config::parse_entry(entry)
}

impl Args {
    pub fn into_config(self) -> Result<StreamerConfig, ConfigError> {
        let config = StreamerConfig::new(
            self.stream_name,
            self.format.into(),
            self.output_format.into(),
            Some(self.output_key),
            self.add_entries,
        )?;
        Ok(config
            .with_region(self.region)
            .with_profile(self.profile))
    }
}
