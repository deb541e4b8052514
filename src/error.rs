//! db-router-core/src/error.rs
//! Error taxonomy for configuration and routing failures.

use thiserror::Error;

/// Errors raised while parsing or validating configuration. These always
/// propagate to the caller of `Route::new`/`RouterConfig::validate` and are
/// never logged-and-swallowed.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid address '{0}': {1}")]
    InvalidAddress(String, String),

    #[error("destination list is empty")]
    EmptyDestinations,

    #[error("destination '{0}' would route a connection back to its own bind address")]
    SelfLoopDestination(String),

    #[error(
        "Invalid URI scheme; expecting: 'metadata-cache' is: '{0}'"
    )]
    InvalidUriScheme(String),

    #[error("Missing 'role' in routing destination specification")]
    MissingRole,

    #[error("invalid role '{0}'; expected PRIMARY, SECONDARY or PRIMARY_AND_SECONDARY")]
    InvalidRole(String),

    #[error("invalid access mode '{0}'; expected 'read-write' or 'read-only'")]
    InvalidAccessMode(String),

    #[error("route '{0}' is missing required option 'mode'")]
    MissingMode(String),

    #[error("route name '{0}' is already registered")]
    DuplicateRoute(String),

    #[error("route '{0}' has neither bind_address/bind_port nor socket configured")]
    NoBindTarget(String),

    #[error("failed to bind listener for route '{route}' at {addr}: {source}")]
    BindFailed {
        route: String,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to read configuration file '{0}': {1}")]
    ConfigRead(String, std::io::Error),

    #[error("route '{0}' cannot be reconfigured while started")]
    AlreadyStarted(String),

    #[error("no route named '{0}' is registered")]
    RouteNotFound(String),
}
