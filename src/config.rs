//! db-router-core/src/config.rs
//! `[routing.<name>]` TOML configuration, deserialized with `serde` and
//! turned into validated `RouteConfig`s the core consumes. Mirrors the
//! table in the router's external-interface documentation; every field
//! carries the default from that table via `#[serde(default = ...)]`.

use crate::address::{AccessMode, Address, ProtocolKind};
use crate::destination::{DestinationSet, MetadataCache};
use crate::error::RouterError;
use crate::route::RouteConfig;
use crate::socket_ops::TokioSocketOps;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_protocol() -> String {
    "classic".to_string()
}
fn default_connect_timeout() -> u64 {
    1
}
fn default_client_connect_timeout() -> u64 {
    9
}
fn default_max_connections() -> u32 {
    512
}
fn default_max_connect_errors() -> u64 {
    100
}
fn default_net_buffer_length() -> usize {
    16384
}

#[derive(Debug, Deserialize)]
pub struct RouteSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    pub bind_port: Option<u16>,
    pub socket: Option<PathBuf>,
    pub destinations: Option<String>,
    pub mode: Option<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_client_connect_timeout")]
    pub client_connect_timeout: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_max_connect_errors")]
    pub max_connect_errors: u64,
    #[serde(default = "default_net_buffer_length")]
    pub net_buffer_length: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Top-level configuration document: one `[routing.<name>]` section per
/// `Route`, plus a process-wide logging level. Parsing never fails on a
/// missing optional field — only `validate` can reject a section, and only
/// for reasons that are semantic rather than syntactic (missing `mode`, a
/// self-loop, etc).
#[derive(Debug, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub routing: HashMap<String, RouteSection>,
}

impl RouterConfig {
    pub fn from_str(toml_text: &str) -> Result<Self, RouterError> {
        Ok(toml::from_str(toml_text)?)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, RouterError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RouterError::ConfigRead(path.display().to_string(), e))?;
        Self::from_str(&text)
    }

    /// Validates every section and builds its `RouteConfig`. `cache` is
    /// consulted only for sections whose `destinations` is a
    /// `metadata-cache://` URI; sections with a static CSV list never
    /// touch it.
    pub fn validate(
        &self,
        cache: Option<Arc<dyn MetadataCache>>,
    ) -> Result<Vec<RouteConfig>, RouterError> {
        let mut routes = Vec::with_capacity(self.routing.len());
        for (name, section) in &self.routing {
            routes.push(build_route_config(name, section, cache.clone())?);
        }
        Ok(routes)
    }
}

fn build_route_config(
    name: &str,
    section: &RouteSection,
    cache: Option<Arc<dyn MetadataCache>>,
) -> Result<RouteConfig, RouterError> {
    let protocol = ProtocolKind::parse(&section.protocol)?;

    let access_mode = match &section.mode {
        Some(m) => AccessMode::parse(m)?,
        None => return Err(RouterError::MissingMode(name.to_string())),
    };

    let bind_tcp = resolve_bind_tcp(section, protocol)?;
    let bind_local_path = section.socket.clone();
    if bind_tcp.is_none() && bind_local_path.is_none() {
        return Err(RouterError::NoBindTarget(name.to_string()));
    }

    let destinations_spec = section
        .destinations
        .as_deref()
        .ok_or(RouterError::EmptyDestinations)?;
    let destinations = if destinations_spec.contains("://") {
        let cache = cache.ok_or(RouterError::EmptyDestinations)?;
        DestinationSet::from_uri(destinations_spec, cache)?
    } else {
        let bind_for_self_loop = bind_tcp.clone().unwrap_or(Address {
            host: String::new(),
            port: 0,
        });
        DestinationSet::from_csv(destinations_spec, protocol, &bind_for_self_loop)?
    };

    Ok(RouteConfig {
        name: name.to_string(),
        access_mode,
        protocol,
        bind_tcp,
        bind_local_path,
        destinations,
        max_connections: section.max_connections,
        connect_timeout: Duration::from_secs(section.connect_timeout),
        client_connect_timeout: Duration::from_secs(section.client_connect_timeout),
        net_buffer_len: section.net_buffer_length,
        max_connect_errors: section.max_connect_errors,
        socket_ops: Arc::new(TokioSocketOps),
    })
}

/// `bind_address` may already carry a port (`"host:port"`); otherwise
/// `bind_port` supplies it. Neither present means "no TCP listener for
/// this route" (a `socket`-only route), not an error by itself.
fn resolve_bind_tcp(
    section: &RouteSection,
    protocol: ProtocolKind,
) -> Result<Option<Address>, RouterError> {
    let parsed = Address::parse(&section.bind_address)?;
    if parsed.port != 0 {
        return Ok(Some(parsed.with_default_port(protocol)));
    }
    match section.bind_port {
        Some(port) => Ok(Some(Address {
            host: parsed.host,
            port,
        })),
        None => Ok(None),
    }
}
