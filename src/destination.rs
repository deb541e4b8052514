//! db-router-core/src/destination.rs
//! Backend selection: a static CSV list, or an indirection through an
//! external metadata cache that supplies a dynamic, role-labelled set.

use crate::address::{Address, AccessMode, ProtocolKind};
use crate::error::RouterError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

/// The role a metadata-cache-reported instance currently plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Primary,
    Secondary,
}

/// The role filter carried by a `metadata-cache://` destination URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleFilter {
    Primary,
    Secondary,
    PrimaryAndSecondary,
}

impl RoleFilter {
    fn parse(s: &str) -> Result<Self, RouterError> {
        match s {
            "PRIMARY" => Ok(RoleFilter::Primary),
            "SECONDARY" => Ok(RoleFilter::Secondary),
            "PRIMARY_AND_SECONDARY" => Ok(RoleFilter::PrimaryAndSecondary),
            other => Err(RouterError::InvalidRole(other.to_string())),
        }
    }
}

/// External collaborator that knows the current membership of a named
/// metadata-cache group. The router core only ever calls `instances`; how
/// the cache itself is populated and kept fresh is out of scope.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn instances(&self, cache_name: &str) -> Vec<(Address, Role)>;
}

enum Backing {
    Static {
        list: Vec<Address>,
    },
    Dynamic {
        cache_name: String,
        role: RoleFilter,
        cache: Arc<dyn MetadataCache>,
    },
}

/// An ordered set of backends a route can dial, plus the round-robin
/// cursor used to pick the next one for a new client.
pub struct DestinationSet {
    backing: Backing,
    cursor: AtomicUsize,
}

impl DestinationSet {
    /// Parses a comma-separated `Address` list. Fails if the list is
    /// empty, any element fails to parse, or any element's `(host, port)`
    /// would route a connection back to the route's own bind address
    /// (self-loop prevention).
    pub fn from_csv(
        csv: &str,
        protocol: ProtocolKind,
        bind_addr: &Address,
    ) -> Result<Self, RouterError> {
        let mut list = Vec::new();
        for part in csv.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let addr = Address::parse(part)?.with_default_port(protocol);
            if &addr == bind_addr {
                return Err(RouterError::SelfLoopDestination(addr.to_string()));
            }
            list.push(addr);
        }
        if list.is_empty() {
            return Err(RouterError::EmptyDestinations);
        }
        Ok(DestinationSet {
            backing: Backing::Static { list },
            cursor: AtomicUsize::new(0),
        })
    }

    /// Parses a `metadata-cache://<name>/<key>?role=...` URI. Only the
    /// `metadata-cache` scheme is accepted; the host segment supplies the
    /// cache name; the query string must include a recognized `role`.
    pub fn from_uri(uri: &str, cache: Arc<dyn MetadataCache>) -> Result<Self, RouterError> {
        let parsed = Url::parse(uri).map_err(|_| {
            RouterError::InvalidAddress(uri.to_string(), "not a valid URI".to_string())
        })?;

        if parsed.scheme() != "metadata-cache" {
            return Err(RouterError::InvalidUriScheme(parsed.scheme().to_string()));
        }

        let cache_name = parsed
            .host_str()
            .map(|s| s.to_string())
            .unwrap_or_default();

        let role = parsed
            .query_pairs()
            .find(|(k, _)| k == "role")
            .map(|(_, v)| v.to_string())
            .ok_or(RouterError::MissingRole)?;
        let role = RoleFilter::parse(&role)?;

        Ok(DestinationSet {
            backing: Backing::Dynamic {
                cache_name,
                role,
                cache,
            },
            cursor: AtomicUsize::new(0),
        })
    }

    /// Selects the next destination for a new client. `Static` sets round
    /// robin over their fixed list, each call advancing the shared cursor
    /// regardless of whether the caller ends up connecting successfully —
    /// this is what keeps a string of failures from hammering the same
    /// backend for every new connection ("sticky on failure"). `Dynamic`
    /// sets re-resolve against the metadata cache on every call and round
    /// robin within that snapshot, filtered by `access_mode`.
    pub async fn next(&self, access_mode: AccessMode) -> Option<Address> {
        match &self.backing {
            Backing::Static { list } => {
                if list.is_empty() {
                    return None;
                }
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % list.len();
                Some(list[idx].clone())
            }
            Backing::Dynamic {
                cache_name, role, cache,
            } => {
                let instances = cache.instances(cache_name).await;
                let candidates = filter_by_role(&instances, *role, access_mode);
                if candidates.is_empty() {
                    return None;
                }
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
                Some(candidates[idx].clone())
            }
        }
    }

    /// Number of destinations currently eligible; used by the route to
    /// bound how many times it retries `next()` before giving up on a
    /// single incoming connection.
    pub async fn len(&self, access_mode: AccessMode) -> usize {
        match &self.backing {
            Backing::Static { list } => list.len(),
            Backing::Dynamic {
                cache_name, role, cache,
            } => {
                let instances = cache.instances(cache_name).await;
                filter_by_role(&instances, *role, access_mode).len()
            }
        }
    }
}

/// Applies the role filter carried by the URI together with the
/// connection's requested access mode. `ReadOnly` prefers `Secondary`
/// instances when any exist, falling back to `Primary`. `ReadWrite`
/// requires a `Primary` instance.
fn filter_by_role(
    instances: &[(Address, Role)],
    uri_role: RoleFilter,
    access_mode: AccessMode,
) -> Vec<Address> {
    let wants_secondary = match (uri_role, access_mode) {
        (RoleFilter::Secondary, _) => true,
        (RoleFilter::Primary, _) => false,
        (RoleFilter::PrimaryAndSecondary, AccessMode::ReadOnly) => true,
        (RoleFilter::PrimaryAndSecondary, _) => false,
    };

    if wants_secondary {
        let secondaries: Vec<Address> = instances
            .iter()
            .filter(|(_, r)| *r == Role::Secondary)
            .map(|(a, _)| a.clone())
            .collect();
        if !secondaries.is_empty() {
            return secondaries;
        }
        if uri_role == RoleFilter::PrimaryAndSecondary {
            return instances
                .iter()
                .filter(|(_, r)| *r == Role::Primary)
                .map(|(a, _)| a.clone())
                .collect();
        }
        return Vec::new();
    }

    instances
        .iter()
        .filter(|(_, r)| *r == Role::Primary)
        .map(|(a, _)| a.clone())
        .collect()
}
