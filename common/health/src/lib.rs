use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, PoisonError, RwLock};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

/// Health reporting for the background loops of a service.
///
/// Each loop registers itself as a component and must report healthy more often
/// than its deadline. The process is healthy when every registered component is:
///   - a component that reported `Unhealthy` or is still `Starting` fails the check
///   - a component whose `HealthyUntil` deadline has passed is reported as `Stalled`
///   - a registry with no components is unhealthy
///
/// Liveness and readiness should use separate registries.
#[derive(Default, Debug)]
pub struct HealthStatus {
    /// The overall status: true if all components are healthy
    pub healthy: bool,
    /// Current status of each registered component, for display
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    /// Computes the axum status code based on the overall health status,
    /// and prints each component status in the body for debugging.
    fn into_response(self) -> Response {
        let body = format!("{:?}", self);
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Automatically set when a component is newly registered
    Starting,
    /// Recently reported healthy, will need to report again before the date
    HealthyUntil(OffsetDateTime),
    /// Reported unhealthy
    Unhealthy,
    /// Computed when the HealthyUntil deadline is reached
    Stalled,
}

type Components = Arc<RwLock<HashMap<String, ComponentStatus>>>;

pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: Components,
}

impl HealthHandle {
    /// Report healthy until `now + deadline`.
    /// Must be called more frequently than the configured deadline.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc().add(self.deadline),
        ))
    }

    pub fn report_status(&self, status: ComponentStatus) {
        let mut components = self
            .components
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        _ = components.insert(self.component.clone(), status);
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: Components,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Default::default(),
        }
    }

    /// Registers a new component in the registry. The returned handle should be passed
    /// to the component, to allow it to frequently report its health status.
    pub fn register(&self, component: String, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component,
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Returns the overall process status, computed from the status of all the components
    /// currently registered. Can be used as an axum handler.
    pub fn get_status(&self) -> HealthStatus {
        self.status_at(OffsetDateTime::now_utc())
    }

    fn status_at(&self, now: OffsetDateTime) -> HealthStatus {
        let components = self
            .components
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let initial = HealthStatus {
            healthy: !components.is_empty(),
            components: Default::default(),
        };

        let result = components
            .iter()
            .fold(initial, |mut result, (name, status)| {
                let status = match status {
                    ComponentStatus::HealthyUntil(until) if *until > now => status.clone(),
                    ComponentStatus::HealthyUntil(_) => {
                        result.healthy = false;
                        ComponentStatus::Stalled
                    }
                    _ => {
                        result.healthy = false;
                        status.clone()
                    }
                };
                _ = result.components.insert(name.clone(), status);
                result
            });

        match result.healthy {
            true => info!("{} health check ok", self.name),
            false => warn!("{} health check failed: {:?}", self.name, result.components),
        }
        result
    }
}
