use std::future::Future;
use std::sync::Arc;

use health::{HealthHandle, HealthRegistry};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::registry::Registry;
use crate::router;
use crate::time::SystemTime;

const FALLBACK_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Sweeps the expiry loop may miss before liveness reports it stalled.
const MISSED_SWEEPS: u32 = 3;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = Arc::new(
        Registry::new(config.document_ttl.0, Arc::new(SystemTime {}))
            .with_identity(config.identity()),
    );

    let period = sweep_period(config.expiry_sweep_interval.0);
    let liveness = HealthRegistry::new("liveness");
    let sweeper = liveness.register("expiry_sweeper".to_string(), liveness_deadline(period));
    tokio::spawn(expiry_loop(registry.clone(), sweeper, period));

    let app = router::router(registry, liveness, config.export_prometheus);

    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {:?}", addr),
        Err(e) => tracing::warn!("listening on unknown address: {}", e),
    }

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!("server stopped with an error: {}", e);
    }
}

fn sweep_period(interval: time::Duration) -> std::time::Duration {
    std::time::Duration::try_from(interval)
        .ok()
        .filter(|period| !period.is_zero())
        .unwrap_or(FALLBACK_SWEEP_INTERVAL)
}

fn liveness_deadline(period: std::time::Duration) -> time::Duration {
    period
        .checked_mul(MISSED_SWEEPS)
        .and_then(|deadline| time::Duration::try_from(deadline).ok())
        .unwrap_or(time::Duration::minutes(3))
}

/// Bounds memory by dropping documents nobody can read anymore.
async fn expiry_loop(registry: Arc<Registry>, handle: HealthHandle, period: std::time::Duration) {
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;
        _ = registry.purge_expired();
        handle.report_healthy();
    }
}
