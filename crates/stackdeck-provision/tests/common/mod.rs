//! Shared wiremock harness for chain tests

#![allow(dead_code)]

use serde_json::{Value, json};
use stackdeck_cloud::{
    Collection, InventoryCache, LogLine, LogSink, ResourceClient, Subsystem, TokenManager,
};
use stackdeck_config::{Credentials, Endpoints};
use stackdeck_provision::{Orchestrator, ProvisionSettings};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const PROJECT_ID: &str = "proj-1";
pub const EXTERNAL_NETWORK_ID: &str = "ext-net";

pub struct TestCloud {
    pub server: MockServer,
    pub dir: TempDir,
    pub rx: UnboundedReceiver<LogLine>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn collection_path(collection: Collection) -> String {
    let prefix = match collection.subsystem() {
        Subsystem::Compute => "/compute",
        Subsystem::Network => "/network",
    };
    format!("{}{}", prefix, collection.list_path())
}

pub fn empty_list(collection: Collection) -> Value {
    let mut body = serde_json::Map::new();
    body.insert(collection.items_key().to_string(), json!([]));
    Value::Object(body)
}

/// Orchestrator against a fresh mock cloud with a valid cached token.
pub async fn setup() -> TestCloud {
    setup_with(|settings| settings).await
}

pub async fn setup_with(
    customize: impl FnOnce(ProvisionSettings) -> ProvisionSettings,
) -> TestCloud {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("token_cache.json"),
        r#"{"token": "tok", "expires_at": "2999-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    let (log, rx) = LogSink::channel();
    let endpoints = Endpoints::under(&server.uri());
    let http = reqwest::Client::new();
    let tokens = Arc::new(TokenManager::new(
        http.clone(),
        endpoints.identity.clone(),
        Credentials::new("user-1", "secret", PROJECT_ID),
        dir.path().join("token_cache.json"),
        log.clone(),
    ));
    let client = Arc::new(ResourceClient::new(http, endpoints, log.clone()));
    let inventory = Arc::new(InventoryCache::new(
        tokens.clone(),
        client.clone(),
        dir.path().join("openstack_data.json"),
        log.clone(),
    ));
    let settings = customize(ProvisionSettings {
        project_id: PROJECT_ID.to_string(),
        external_network_id: EXTERNAL_NETWORK_ID.to_string(),
        key_pair_name: None,
        settle_delay: Duration::ZERO,
    });

    TestCloud {
        server,
        dir,
        rx,
        orchestrator: Arc::new(Orchestrator::new(tokens, client, inventory, settings, log)),
    }
}

impl TestCloud {
    pub fn write_snapshot(&self, snapshot: Value) {
        std::fs::write(
            self.orchestrator.inventory().snapshot_path(),
            serde_json::to_string(&snapshot).unwrap(),
        )
        .unwrap();
    }

    /// Answer every collection listing, `bodies` overriding the empty default.
    ///
    /// Mounted at low priority so call-specific mocks win.
    pub async fn mount_inventory(&self, bodies: Value) {
        for collection in Collection::ALL {
            let body = bodies
                .get(collection.key())
                .cloned()
                .unwrap_or_else(|| empty_list(collection));
            Mock::given(method("GET"))
                .and(path(collection_path(collection)))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .with_priority(10)
                .mount(&self.server)
                .await;
        }
    }

    pub async fn mount(&self, verb: &str, route: &str, status: u16, body: Value) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    pub async fn calls(&self, verb: &str, route: &str) -> Vec<Request> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.method.as_str() == verb && r.url.path() == route)
            .collect()
    }

    pub fn lines(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.rx.try_recv().ok())
            .map(|line| line.to_string())
            .collect()
    }
}

/// A snapshot with one image, flavor, network and security group
pub fn base_inventory() -> Value {
    json!({
        "images": {"images": [{"id": "img-1", "name": "ubuntu-22.04"}]},
        "flavors": {"flavors": [{"id": "flv-1", "name": "m1.small", "vcpus": 1, "ram": 2048, "disk": 20}]},
        "networks": {"networks": [{"id": "net-1", "name": "private"}]},
        "security_groups": {"security_groups": [
            {"id": "sg-1", "name": "default"},
            {"id": "sg-2", "name": "web"}
        ]},
        "servers": {"servers": [{"id": "srv-0", "name": "existing"}]}
    })
}
