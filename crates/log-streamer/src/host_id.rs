// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host identity used as the partition key for every record.
//!
//! Sources are tried strictly in order and the first success is kept for the
//! life of the resolver:
//!
//! 1. ECS task metadata v4 (`$ECS_CONTAINER_METADATA_URI_V4/task`), if set
//! 2. ECS task metadata v3 (`$ECS_CONTAINER_METADATA_URI/task`), if set
//! 3. ECS task metadata v2 (`http://169.254.170.2/v2/metadata`)
//! 4. EC2 instance metadata, composed into an instance ARN
//! 5. The first global unicast address of a local interface
//! 6. 128 random bits

use anyhow::{bail, Context};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use rand::TryRngCore;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::constants::{
    EC2_METADATA_ENDPOINT, EC2_METADATA_PATH, EC2_TOKEN_PATH, EC2_TOKEN_TTL_SECONDS,
    ECS_METADATA_V2_URL, ECS_METADATA_V3_ENV, ECS_METADATA_V4_ENV, IP_ADDRESS_PREFIX,
    METADATA_TIMEOUT, RANDOM_ID_PREFIX,
};
use crate::errors::{HostIdError, SourceFailure};

const EC2_TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const EC2_TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";

lazy_static! {
    /// Region prefix of a traditional (`us-east-1a`) or local (`us-west-2-lax-1a`) zone.
    static ref AVAILABILITY_ZONE: Regex = availability_zone_regex();
}

#[allow(clippy::expect_used)]
fn availability_zone_regex() -> Regex {
    Regex::new(r"^([a-z]+(?:-[a-z]+)*-[1-9][0-9]*)(?:[a-z]+|-[a-z]+-[1-9][0-9]*[a-z]+)$")
        .expect("failed creating regex")
}

#[derive(Debug, Deserialize)]
struct TaskMetadata {
    #[serde(rename = "TaskARN")]
    task_arn: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstanceIdentity {
    #[serde(rename = "AccountId")]
    account_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostId(Arc<str>);

impl HostId {
    #[must_use]
    pub fn partition_key(&self) -> Arc<str> {
        Arc::clone(&self.0)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One step of the resolution chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// ECS task metadata. `configured` is set when the URL came from the
    /// environment; failures of configured sources are logged as warnings.
    EcsTaskMetadata {
        version: u8,
        url: String,
        configured: bool,
    },
    Ec2InstanceMetadata {
        endpoint: String,
    },
    NetworkInterface,
    Random,
}

impl IdentitySource {
    fn is_configured(&self) -> bool {
        matches!(
            self,
            IdentitySource::EcsTaskMetadata {
                configured: true,
                ..
            }
        )
    }
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentitySource::EcsTaskMetadata { version, .. } => {
                write!(f, "ECS metadata v{version} endpoint")
            }
            IdentitySource::Ec2InstanceMetadata { .. } => write!(f, "EC2 metadata endpoint"),
            IdentitySource::NetworkInterface => write!(f, "network interface"),
            IdentitySource::Random => write!(f, "random host ID"),
        }
    }
}

/// The default chain, with the ECS v4/v3 steps present only when their
/// environment variables are set.
#[must_use]
pub fn default_sources() -> Vec<IdentitySource> {
    let mut sources = Vec::with_capacity(6);
    for (version, var) in [(4, ECS_METADATA_V4_ENV), (3, ECS_METADATA_V3_ENV)] {
        if let Some(base) = env::var(var).ok().filter(|v| !v.is_empty()) {
            sources.push(IdentitySource::EcsTaskMetadata {
                version,
                url: format!("{base}/task"),
                configured: true,
            });
        }
    }
    sources.push(IdentitySource::EcsTaskMetadata {
        version: 2,
        url: ECS_METADATA_V2_URL.to_string(),
        configured: false,
    });
    sources.push(IdentitySource::Ec2InstanceMetadata {
        endpoint: EC2_METADATA_ENDPOINT.to_string(),
    });
    sources.push(IdentitySource::NetworkInterface);
    sources.push(IdentitySource::Random);
    sources
}

pub struct HostIdResolver {
    client: Client,
    sources: Vec<IdentitySource>,
    cached: OnceCell<HostId>,
}

impl HostIdResolver {
    pub fn from_env() -> Result<Self, HostIdError> {
        Self::with_sources(default_sources())
    }

    pub fn with_sources(sources: Vec<IdentitySource>) -> Result<Self, HostIdError> {
        let client = Client::builder().timeout(METADATA_TIMEOUT).build()?;
        Ok(HostIdResolver {
            client,
            sources,
            cached: OnceCell::new(),
        })
    }

    /// Returns the cached identity, walking the chain on first use.
    pub async fn resolve(&self) -> Result<HostId, HostIdError> {
        self.cached
            .get_or_try_init(|| self.walk_sources())
            .await
            .cloned()
    }

    async fn walk_sources(&self) -> Result<HostId, HostIdError> {
        let mut failures = Vec::new();

        for source in &self.sources {
            match self.try_source(source).await {
                Ok(id) => {
                    debug!("Using host ID {id} from {source}");
                    return Ok(HostId(Arc::from(id)));
                }
                Err(reason) => {
                    if source.is_configured() {
                        warn!("Failed to get host ID from {source}: {reason:#}");
                    } else {
                        debug!("Failed to get host ID from {source}: {reason:#}");
                    }
                    failures.push(SourceFailure {
                        source: source.to_string(),
                        reason,
                    });
                }
            }
        }

        Err(HostIdError::Exhausted(failures))
    }

    async fn try_source(&self, source: &IdentitySource) -> anyhow::Result<String> {
        match source {
            IdentitySource::EcsTaskMetadata { url, .. } => task_arn(&self.client, url).await,
            IdentitySource::Ec2InstanceMetadata { endpoint } => {
                instance_arn(&self.client, endpoint).await
            }
            IdentitySource::NetworkInterface => interface_address(),
            IdentitySource::Random => random_id(),
        }
    }
}

async fn task_arn(client: &Client, url: &str) -> anyhow::Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url} failed"))?;
    if response.status() != StatusCode::OK {
        bail!("Failed to read ECS metadata endpoint: {}", response.status());
    }

    let metadata: TaskMetadata = response
        .json()
        .await
        .context("Failed to parse ECS metadata result as JSON")?;
    match metadata.task_arn {
        Some(arn) if !arn.is_empty() => Ok(arn),
        _ => bail!("ECS metadata does not contain a valid TaskARN element"),
    }
}

async fn instance_arn(client: &Client, endpoint: &str) -> anyhow::Result<String> {
    let token = match session_token(client, endpoint).await {
        Ok(token) => Some(token),
        Err(e) => {
            debug!("Reading EC2 metadata without a session token: {e:#}");
            None
        }
    };
    let token = token.as_deref();

    let partition = ec2_metadata(client, endpoint, token, "services/partition").await?;

    let identity = ec2_metadata(client, endpoint, token, "identity-credentials/ec2/info").await?;
    let identity: InstanceIdentity = serde_json::from_str(&identity)
        .context("Unable to parse instance identity credentials as JSON")?;
    let account_id = identity
        .account_id
        .filter(|id| !id.is_empty())
        .context("AccountId not present in instance identity credentials")?;

    let zone = ec2_metadata(client, endpoint, token, "placement/availability-zone").await?;
    let instance_id = ec2_metadata(client, endpoint, token, "instance-id").await?;

    let region = region_from_availability_zone(&zone)
        .with_context(|| format!("Unrecognized availability zone: {zone}"))?;

    Ok(format!(
        "arn:{partition}:ec2:{region}:{account_id}:instance/{instance_id}"
    ))
}

async fn session_token(client: &Client, endpoint: &str) -> anyhow::Result<String> {
    let response = client
        .put(format!("{endpoint}{EC2_TOKEN_PATH}"))
        .header(EC2_TOKEN_TTL_HEADER, EC2_TOKEN_TTL_SECONDS)
        .send()
        .await?;
    if response.status() != StatusCode::OK {
        bail!("token request returned {}", response.status());
    }
    let token = response.text().await?;
    if token.is_empty() {
        bail!("token response is empty");
    }
    Ok(token)
}

async fn ec2_metadata(
    client: &Client,
    endpoint: &str,
    token: Option<&str>,
    path: &str,
) -> anyhow::Result<String> {
    let mut request = client.get(format!("{endpoint}{EC2_METADATA_PATH}{path}"));
    if let Some(token) = token {
        request = request.header(EC2_TOKEN_HEADER, token);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("GET {path} failed"))?;
    if response.status() != StatusCode::OK {
        bail!("Failed to read EC2 metadata endpoint: {}", response.status());
    }

    let body = response
        .text()
        .await
        .with_context(|| format!("Failed to read EC2 metadata {path}"))?;
    if body.is_empty() {
        bail!("EC2 {path} is empty");
    }
    Ok(body)
}

/// Extracts the region from an availability zone name, covering both
/// traditional zones (`us-east-1a`) and local zones (`us-west-2-lax-1a`).
#[must_use]
pub fn region_from_availability_zone(zone: &str) -> Option<&str> {
    let captures = AVAILABILITY_ZONE.captures(zone)?;
    captures.get(1).map(|region| region.as_str())
}

fn interface_address() -> anyhow::Result<String> {
    let addresses = nix::ifaddrs::getifaddrs().context("Unable to list network interfaces")?;

    for interface in addresses {
        let Some(address) = interface.address else {
            continue;
        };
        let ip = if let Some(sin) = address.as_sockaddr_in() {
            IpAddr::V4(*SocketAddrV4::from(*sin).ip())
        } else if let Some(sin6) = address.as_sockaddr_in6() {
            IpAddr::V6(*SocketAddrV6::from(*sin6).ip())
        } else {
            continue;
        };

        if is_global_unicast(&ip) {
            return Ok(format!("{IP_ADDRESS_PREFIX}{ip}"));
        }
    }

    bail!("No valid IP addresses found")
}

/// Any unicast address outside loopback and link-local scope. Private ranges
/// count as global here.
#[must_use]
pub fn is_global_unicast(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_unspecified()
                || v4.is_loopback()
                || v4.is_multicast()
                || v4.is_link_local()
                || *v4 == Ipv4Addr::BROADCAST)
        }
        IpAddr::V6(v6) => {
            !(v6.is_unspecified()
                || v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unicast_link_local())
        }
    }
}

fn random_id() -> anyhow::Result<String> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("Unable to read from the OS random source")?;

    Ok(format!("{RANDOM_ID_PREFIX}{}", hex::encode(bytes)))
}
