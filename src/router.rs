//! db-router-core/src/router.rs
//! Registry of named routes: lifecycle and aggregate stats. No
//! cross-route coordination — each `Route` is independent.

use crate::error::RouterError;
use crate::metrics::RouterMetricsSnapshot;
use crate::route::{Route, RouteConfig};
use crate::socket_ops::TokioSocketOps;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub struct Router {
    routes: RwLock<HashMap<String, Arc<Route>>>,
}

impl Router {
    pub fn new() -> Self {
        Router {
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Validates and registers a route under its configured name. Does not
    /// start it — call `start_all` or `start_route` once every route the
    /// caller wants is registered.
    pub async fn add_route(&self, cfg: RouteConfig) -> Result<(), RouterError> {
        let name = cfg.name.clone();
        let route = Route::new(cfg)?;
        let mut routes = self.routes.write().await;
        if routes.contains_key(&name) {
            return Err(RouterError::DuplicateRoute(name));
        }
        routes.insert(name, route);
        Ok(())
    }

    pub async fn start_route(&self, name: &str) -> Result<(), RouterError> {
        let route = self
            .routes
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RouterError::RouteNotFound(name.to_string()))?;
        route.start().await
    }

    pub async fn start_all(&self) -> Result<(), RouterError> {
        let routes: Vec<Arc<Route>> = self.routes.read().await.values().cloned().collect();
        for route in routes {
            route.start().await?;
        }
        info!("router started all routes");
        Ok(())
    }

    pub async fn stop_all(&self) {
        let routes: Vec<Arc<Route>> = self.routes.read().await.values().cloned().collect();
        for route in routes {
            route.stop().await;
        }
        info!("router stopped all routes");
    }

    pub async fn route_names(&self) -> Vec<String> {
        self.routes.read().await.keys().cloned().collect()
    }

    pub async fn metrics_snapshot(&self) -> RouterMetricsSnapshot {
        let routes = self.routes.read().await;
        let snapshots = routes
            .iter()
            .map(|(name, route)| (name.clone(), route.metrics_snapshot()))
            .collect();
        RouterMetricsSnapshot::from_routes(snapshots)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
