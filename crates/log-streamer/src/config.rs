// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt;

use crate::constants::DEFAULT_OUTPUT_KEY;
use crate::errors::ConfigError;

/// How the incoming byte stream is split into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    #[default]
    Line,
    Json,
}

/// Requested payload encoding, before it is matched against the input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Auto,
    Json,
    String,
}

/// Payload encoding after `auto` has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Json,
    String,
}

impl OutputFormat {
    /// `auto` maps line input to plain strings and JSON input to JSON.
    #[must_use]
    pub fn resolve(self, input: InputFormat) -> PayloadFormat {
        match (self, input) {
            (OutputFormat::Json, _) | (OutputFormat::Auto, InputFormat::Json) => {
                PayloadFormat::Json
            }
            (OutputFormat::String, _) | (OutputFormat::Auto, InputFormat::Line) => {
                PayloadFormat::String
            }
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputFormat::Line => write!(f, "line"),
            InputFormat::Json => write!(f, "json"),
        }
    }
}

/// Splits a `key=value` argument at the first `=`.
pub fn parse_entry(entry: &str) -> Result<(String, String), ConfigError> {
    match entry.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(ConfigError::MissingSeparator(entry.to_string())),
    }
}

/// Collects `--add-entry` pairs, rejecting repeated keys.
pub fn collect_entries<I>(entries: I) -> Result<BTreeMap<String, String>, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut collected = BTreeMap::new();
    for (key, value) in entries {
        if collected.contains_key(&key) {
            return Err(ConfigError::DuplicateEntry(key));
        }
        collected.insert(key, value);
    }
    Ok(collected)
}

/// Validated settings for one streaming run.
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    pub stream_name: String,
    pub input_format: InputFormat,
    pub payload_format: PayloadFormat,
    /// JSON key for line payloads in JSON output
    pub output_key: String,
    /// Extra fields merged into every JSON object built from a line
    pub additional_entries: BTreeMap<String, String>,
    /// AWS region override; the SDK default chain applies when unset
    pub region: Option<String>,
    /// Named profile for AWS credentials
    pub profile: Option<String>,
}

impl StreamerConfig {
    pub fn new(
        stream_name: String,
        input_format: InputFormat,
        output_format: OutputFormat,
        output_key: Option<String>,
        additional_entries: Vec<(String, String)>,
    ) -> Result<Self, ConfigError> {
        let config = StreamerConfig {
            stream_name,
            input_format,
            payload_format: output_format.resolve(input_format),
            output_key: output_key.unwrap_or_else(|| DEFAULT_OUTPUT_KEY.to_string()),
            additional_entries: collect_entries(additional_entries)?,
            region: None,
            profile: None,
        };
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region.filter(|r| !r.is_empty());
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile.filter(|p| !p.is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_name.trim().is_empty() {
            return Err(ConfigError::MissingStreamName);
        }
        if self.output_key.is_empty() {
            return Err(ConfigError::EmptyOutputKey);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_output_follows_input() {
        assert_eq!(
            OutputFormat::Auto.resolve(InputFormat::Line),
            PayloadFormat::String
        );
        assert_eq!(
            OutputFormat::Auto.resolve(InputFormat::Json),
            PayloadFormat::Json
        );
        assert_eq!(
            OutputFormat::Json.resolve(InputFormat::Line),
            PayloadFormat::Json
        );
        assert_eq!(
            OutputFormat::String.resolve(InputFormat::Json),
            PayloadFormat::String
        );
    }

    #[test]
    fn test_parse_entry_splits_at_first_equals() {
        assert_eq!(
            parse_entry("LogFile=AccessLog"),
            Ok(("LogFile".to_string(), "AccessLog".to_string()))
        );
        assert_eq!(
            parse_entry("Query=a=b"),
            Ok(("Query".to_string(), "a=b".to_string()))
        );
        assert_eq!(parse_entry("Empty="), Ok(("Empty".to_string(), String::new())));
    }

    #[test]
    fn test_parse_entry_without_separator() {
        assert_eq!(
            parse_entry("LogFile"),
            Err(ConfigError::MissingSeparator("LogFile".to_string()))
        );
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let result = StreamerConfig::new(
            "logs".to_string(),
            InputFormat::Line,
            OutputFormat::Json,
            None,
            vec![
                ("LogFile".to_string(), "AccessLog".to_string()),
                ("LogFile".to_string(), "ErrorLog".to_string()),
            ],
        );
        assert_eq!(
            result.unwrap_err(),
            ConfigError::DuplicateEntry("LogFile".to_string())
        );
    }

    #[test]
    fn test_defaults() {
        let config = StreamerConfig::new(
            "logs".to_string(),
            InputFormat::default(),
            OutputFormat::default(),
            None,
            vec![],
        )
        .unwrap()
        .with_region(Some(String::new()))
        .with_profile(Some("dev".to_string()));

        assert_eq!(config.output_key, "LogEntry");
        assert_eq!(config.payload_format, PayloadFormat::String);
        assert!(config.additional_entries.is_empty());
        assert_eq!(config.region, None);
        assert_eq!(config.profile.as_deref(), Some("dev"));
    }

    #[test]
    fn test_empty_stream_name_rejected() {
        let result = StreamerConfig::new(
            "  ".to_string(),
            InputFormat::Line,
            OutputFormat::Auto,
            None,
            vec![],
        );
        assert_eq!(result.unwrap_err(), ConfigError::MissingStreamName);
    }

    #[test]
    fn test_empty_output_key_rejected() {
        let result = StreamerConfig::new(
            "logs".to_string(),
            InputFormat::Line,
            OutputFormat::Json,
            Some(String::new()),
            vec![],
        );
        assert_eq!(result.unwrap_err(), ConfigError::EmptyOutputKey);
    }
}
