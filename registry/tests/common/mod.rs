#![allow(dead_code)]

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use indicator_registry::config::{Config, EnvSecsDuration, IdentityLabels};
use indicator_registry::server::serve;

pub static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(|| Config {
    address: SocketAddr::from_str("127.0.0.1:0").unwrap(),
    document_ttl: EnvSecsDuration(time::Duration::hours(2)),
    expiry_sweep_interval: EnvSecsDuration(time::Duration::minutes(1)),
    identity_labels: IdentityLabels::default(),
    export_prometheus: false, // metrics recorder is global, can't install it several times
});

pub struct ServerHandle {
    pub addr: SocketAddr,
    client: reqwest::Client,
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub async fn for_config(config: Config) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            serve(config, listener, async move { notify.notified().await }).await
        });
        ServerHandle {
            addr,
            client: reqwest::Client::new(),
            shutdown,
        }
    }

    pub async fn register<T: Into<reqwest::Body>>(&self, body: T) -> reqwest::Response {
        self.send(reqwest::Method::POST, "/v1/register", body).await
    }

    pub async fn put_patches<T: Into<reqwest::Body>>(&self, body: T) -> reqwest::Response {
        self.send(reqwest::Method::PUT, "/v1/patches", body).await
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("http://{:?}{}", self.addr, path))
            .send()
            .await
            .expect("failed to send request")
    }

    async fn send<T: Into<reqwest::Body>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: T,
    ) -> reqwest::Response {
        self.client
            .request(method, format!("http://{:?}{}", self.addr, path))
            .body(body)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .expect("failed to send request")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}

pub fn document(product: &str, version: &str, deployment: &str) -> Value {
    json!({
        "apiVersion": "indicatorprotocol.io/v1",
        "kind": "IndicatorDocument",
        "metadata": {"labels": {"deployment": deployment}},
        "spec": {
            "product": {"name": product, "version": version},
            "indicators": [{
                "name": "success_percentage",
                "promql": "success_percentage_promql{source_id=\"origin\"}",
                "thresholds": [{"level": "critical", "operator": "lt", "value": 99}],
                "documentation": {"title": "Success Percentage"}
            }]
        }
    })
}
