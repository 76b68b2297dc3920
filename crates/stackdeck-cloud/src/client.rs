//! Authenticated REST calls against the compute and network subsystems
//!
//! [`ResourceClient::send`] is the single place that talks HTTP. It returns a
//! [`CloudError`] for transport failures and unexpected status codes. The typed
//! helpers built on top of it (`create_network`, `associate_floating_ip`, ...)
//! log any failure with their origin tag and hand back `None` (or an empty
//! list), so a failed step never unwinds past this layer.

use crate::error::{CloudError, Result};
use crate::log::{LogSink, LogTag};
use crate::model::{Collection, Port, Subsystem};
use reqwest::Method;
use serde_json::Value;
use stackdeck_config::Endpoints;

const AUTH_HEADER: &str = "X-Auth-Token";

/// One outbound call: method, URL, optional query/body and the status codes
/// that count as success.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub expect: &'static [u16],
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            body: None,
            expect: &[200],
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            query: Vec::new(),
            body: Some(body),
            expect: &[201],
        }
    }

    pub fn put(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PUT,
            url: url.into(),
            query: Vec::new(),
            body: Some(body),
            expect: &[200],
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn expect(mut self, codes: &'static [u16]) -> Self {
        self.expect = codes;
        self
    }
}

/// Everything needed to boot one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub name: String,
    pub image_id: String,
    pub flavor_id: String,
    pub network_id: String,
    pub security_group: String,
    /// Already base64-encoded cloud-init payload
    pub user_data: Option<String>,
    pub key_name: Option<String>,
}

impl ServerSpec {
    pub fn to_payload(&self) -> Value {
        let mut server = serde_json::json!({
            "name": self.name,
            "imageRef": self.image_id,
            "flavorRef": self.flavor_id,
            "networks": [{ "uuid": self.network_id }],
            "security_groups": [{ "name": self.security_group }],
        });
        if let Some(user_data) = &self.user_data {
            server["user_data"] = Value::String(user_data.clone());
        }
        if let Some(key_name) = &self.key_name {
            server["key_name"] = Value::String(key_name.clone());
        }
        serde_json::json!({ "server": server })
    }
}

/// Router creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterSpec {
    pub name: String,
    pub project_id: String,
    pub external_network_id: String,
}

/// Thin typed layer over the compute and network REST APIs
#[derive(Debug, Clone)]
pub struct ResourceClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    log: LogSink,
}

impl ResourceClient {
    pub fn new(http: reqwest::Client, endpoints: Endpoints, log: LogSink) -> Self {
        Self {
            http,
            endpoints,
            log,
        }
    }

    fn base(&self, subsystem: Subsystem) -> &str {
        let base = match subsystem {
            Subsystem::Compute => &self.endpoints.compute,
            Subsystem::Network => &self.endpoints.network,
        };
        base.trim_end_matches('/')
    }

    pub fn url(&self, subsystem: Subsystem, path: &str) -> String {
        format!("{}{}", self.base(subsystem), path)
    }

    /// Issue a request and decode the JSON body.
    ///
    /// An empty body decodes to `Value::Null`.
    pub async fn send(&self, token: &str, request: ApiRequest) -> Result<Value> {
        let ApiRequest {
            method,
            url,
            query,
            body,
            expect,
        } = request;

        tracing::debug!("{} {}", method, url);

        let mut builder = self
            .http
            .request(method, &url)
            .header(AUTH_HEADER, token);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|source| CloudError::Network {
            endpoint: url.clone(),
            source,
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|source| CloudError::Network {
            endpoint: url.clone(),
            source,
        })?;

        if !expect.contains(&status) {
            return Err(CloudError::Api {
                endpoint: url,
                status,
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| CloudError::InvalidResponse {
            endpoint: url,
            reason: e.to_string(),
        })
    }

    /// Log a failed call under `tag` and swallow it.
    fn report<T>(&self, tag: LogTag, what: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(CloudError::Api { status, body, .. }) => {
                self.log
                    .tagged(tag, format!("Failed to {}. Status: {}", what, status));
                self.log.tagged(tag, format!("Response: {}", body));
                None
            }
            Err(e) => {
                self.log
                    .tagged(tag, format!("Exception while trying to {}: {}", what, e));
                None
            }
        }
    }

    /// GET one snapshot collection.
    ///
    /// An empty body is an error so it never lands in the snapshot as `null`.
    pub async fn list(&self, token: &str, collection: Collection) -> Result<Value> {
        let url = self.url(collection.subsystem(), collection.list_path());
        match self.send(token, ApiRequest::get(url.clone())).await? {
            Value::Null => Err(CloudError::InvalidResponse {
                endpoint: url,
                reason: "empty response body".to_string(),
            }),
            body => Ok(body),
        }
    }

    /// Create a network; returns its id.
    pub async fn create_network(&self, token: &str, name: &str) -> Option<String> {
        self.log.plain(format!("--> Creating network '{}'...", name));
        let request = ApiRequest::post(
            self.url(Subsystem::Network, "/networks"),
            serde_json::json!({
                "network": { "name": name, "admin_state_up": true }
            }),
        );
        let body = self.report(
            LogTag::Error,
            &format!("create network '{}'", name),
            self.send(token, request).await,
        )?;
        let id = created_id(&body, "network");
        if id.is_some() {
            self.log
                .plain(format!("--> Network '{}' created successfully.", name));
        }
        id
    }

    /// Create an IPv4 DHCP subnet on `network_id`; returns its id.
    pub async fn create_subnet(
        &self,
        token: &str,
        name: &str,
        network_id: &str,
        cidr: &str,
    ) -> Option<String> {
        self.log
            .plain(format!("--> Creating subnet '{}' ({})...", name, cidr));
        let request = ApiRequest::post(
            self.url(Subsystem::Network, "/subnets"),
            serde_json::json!({
                "subnet": {
                    "name": name,
                    "network_id": network_id,
                    "ip_version": 4,
                    "cidr": cidr,
                    "enable_dhcp": true,
                }
            }),
        );
        let body = self.report(
            LogTag::Error,
            &format!("create subnet '{}'", name),
            self.send(token, request).await,
        )?;
        let id = created_id(&body, "subnet");
        if id.is_some() {
            self.log
                .plain(format!("--> Subnet '{}' created successfully.", name));
        }
        id
    }

    /// Create a router with its gateway on the external network; returns its id.
    pub async fn create_router(&self, token: &str, spec: &RouterSpec) -> Option<String> {
        let request = ApiRequest::post(
            self.url(Subsystem::Network, "/routers"),
            serde_json::json!({
                "router": {
                    "name": spec.name,
                    "project_id": spec.project_id,
                    "external_gateway_info": { "network_id": spec.external_network_id },
                    "admin_state_up": true,
                }
            }),
        );
        let body = self.report(
            LogTag::Router,
            &format!("create router '{}'", spec.name),
            self.send(token, request).await,
        )?;
        let id = created_id(&body, "router")?;
        self.log.tagged(
            LogTag::Router,
            format!("Created router '{}' (ID: {}).", spec.name, id),
        );
        Some(id)
    }

    /// Attach a subnet interface to a router.
    pub async fn add_router_interface(
        &self,
        token: &str,
        router_id: &str,
        subnet_id: &str,
    ) -> Option<Value> {
        let request = ApiRequest::put(
            self.url(
                Subsystem::Network,
                &format!("/routers/{}/add_router_interface", router_id),
            ),
            serde_json::json!({ "subnet_id": subnet_id }),
        )
        .expect(&[200, 201]);
        let body = self.report(
            LogTag::Router,
            &format!("attach subnet {} to router {}", subnet_id, router_id),
            self.send(token, request).await,
        )?;
        self.log.tagged(
            LogTag::Router,
            format!("Attached subnet {} to router {}.", subnet_id, router_id),
        );
        Some(body)
    }

    /// Boot an instance; returns its id.
    pub async fn create_server(&self, token: &str, spec: &ServerSpec) -> Option<String> {
        self.log
            .plain(format!("--> Creating instance '{}'...", spec.name));
        if spec.user_data.is_some() {
            self.log
                .plain("--> Added user_data to payload (base64 encoded).");
        }
        if let Some(key_name) = &spec.key_name {
            self.log
                .plain(format!("--> Added key_name '{}' to payload.", key_name));
        }

        let request = ApiRequest::post(
            self.url(Subsystem::Compute, "/servers"),
            spec.to_payload(),
        )
        .expect(&[202]);
        let body = self.report(
            LogTag::Error,
            &format!("create instance '{}'", spec.name),
            self.send(token, request).await,
        )?;
        let id = created_id(&body, "server");
        if id.is_some() {
            self.log
                .plain(format!("--> Instance '{}' created successfully.", spec.name));
        }
        id
    }

    /// Point a floating IP at a port.
    pub async fn associate_floating_ip(
        &self,
        token: &str,
        floating_ip_id: &str,
        port_id: &str,
    ) -> Option<Value> {
        let request = ApiRequest::put(
            self.url(Subsystem::Network, &format!("/floatingips/{}", floating_ip_id)),
            serde_json::json!({ "floatingip": { "port_id": port_id } }),
        );
        let body = self.report(
            LogTag::FloatingIp,
            &format!("associate floating IP {}", floating_ip_id),
            self.send(token, request).await,
        )?;
        self.log.tagged(
            LogTag::FloatingIp,
            format!(
                "Associated floating IP {} with port {}.",
                floating_ip_id, port_id
            ),
        );
        Some(body)
    }

    /// Live lookup of the ports owned by `device_id`; empty on any failure.
    pub async fn ports_for_device(&self, token: &str, device_id: &str) -> Vec<Port> {
        let request = ApiRequest::get(self.url(Subsystem::Network, "/ports"))
            .query("device_id", device_id);
        let Some(body) = self.report(
            LogTag::Ports,
            &format!("fetch ports for device {}", device_id),
            self.send(token, request).await,
        ) else {
            return Vec::new();
        };

        let ports: Vec<Port> = body
            .get("ports")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|p| serde_json::from_value(p.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        self.log.tagged(
            LogTag::Ports,
            format!("Fetched {} port(s) for device {}.", ports.len(), device_id),
        );
        ports
    }
}

/// `body[kind].id` of a creation response
fn created_id(body: &Value, kind: &str) -> Option<String> {
    body.get(kind)
        .and_then(|obj| obj.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogLine;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> (ResourceClient, tokio::sync::mpsc::UnboundedReceiver<LogLine>) {
        let (log, rx) = LogSink::channel();
        (
            ResourceClient::new(reqwest::Client::new(), Endpoints::under(&server.uri()), log),
            rx,
        )
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<LogLine>) -> Vec<LogLine> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_send_attaches_token_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compute/images"))
            .and(header("X-Auth-Token", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"images": []})))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _rx) = client(&server);
        let body = client.list("tok", Collection::Images).await.unwrap();
        assert_eq!(body, serde_json::json!({"images": []}));
    }

    #[tokio::test]
    async fn test_unexpected_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/network/routers"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let (client, _rx) = client(&server);
        let err = client.list("tok", Collection::Routers).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn test_list_rejects_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compute/images"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let (client, _rx) = client(&server);

        let err = client.list("tok", Collection::Images).await.unwrap_err();
        assert!(matches!(err, CloudError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_create_network_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/network/networks"))
            .and(body_partial_json(serde_json::json!({"network": {"name": "net1", "admin_state_up": true}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"network": {"id": "n1"}})))
            .mount(&server)
            .await;

        let (client, _rx) = client(&server);
        assert_eq!(client.create_network("tok", "net1").await.as_deref(), Some("n1"));
    }

    #[tokio::test]
    async fn test_api_failure_is_logged_and_absorbed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/network/subnets"))
            .respond_with(ResponseTemplate::new(409).set_body_string("{\"NeutronError\": \"overlap\"}"))
            .mount(&server)
            .await;

        let (client, mut rx) = client(&server);
        assert!(client.create_subnet("tok", "sub1", "n1", "10.0.0.0/24").await.is_none());

        let lines = drain(&mut rx);
        assert!(lines.iter().any(|l| l.tag == LogTag::Error && l.text.contains("409")));
        assert!(lines.iter().any(|l| l.text.contains("overlap")));
    }

    #[tokio::test]
    async fn test_transport_failure_is_absorbed() {
        let (log, mut rx) = LogSink::channel();
        let client = ResourceClient::new(
            reqwest::Client::new(),
            Endpoints::under("http://127.0.0.1:9"),
            log,
        );

        assert!(client.associate_floating_ip("tok", "fip-1", "port-1").await.is_none());
        assert!(client.ports_for_device("tok", "srv-1").await.is_empty());

        let lines = drain(&mut rx);
        assert!(lines.iter().any(|l| l.tag == LogTag::FloatingIp && l.text.contains("Exception")));
        assert!(lines.iter().any(|l| l.tag == LogTag::Ports));
    }

    #[tokio::test]
    async fn test_create_server_expects_202() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compute/servers"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"server": {"id": "srv-1"}})))
            .mount(&server)
            .await;

        let (client, _rx) = client(&server);
        let spec = ServerSpec {
            name: "vm1".into(),
            image_id: "img-1".into(),
            flavor_id: "flv-1".into(),
            network_id: "n1".into(),
            security_group: "default".into(),
            user_data: None,
            key_name: None,
        };
        // 201 is not the success code for instance creation
        assert!(client.create_server("tok", &spec).await.is_none());
    }

    #[tokio::test]
    async fn test_router_interface_accepts_200_and_201() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/network/routers/r1/add_router_interface"))
            .and(body_partial_json(serde_json::json!({"subnet_id": "s1"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "r1"})))
            .mount(&server)
            .await;

        let (client, _rx) = client(&server);
        assert!(client.add_router_interface("tok", "r1", "s1").await.is_some());
    }

    #[tokio::test]
    async fn test_ports_for_device_uses_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/network/ports"))
            .and(query_param("device_id", "srv-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ports": [{"id": "port-1", "device_id": "srv-1"}]
            })))
            .mount(&server)
            .await;

        let (client, _rx) = client(&server);
        let ports = client.ports_for_device("tok", "srv-1").await;
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].id, "port-1");
    }

    #[test]
    fn test_server_payload_optional_fields() {
        let mut spec = ServerSpec {
            name: "vm1".into(),
            image_id: "img-1".into(),
            flavor_id: "flv-1".into(),
            network_id: "n1".into(),
            security_group: "web".into(),
            user_data: None,
            key_name: None,
        };
        let payload = spec.to_payload();
        assert_eq!(payload["server"]["security_groups"][0]["name"], "web");
        assert_eq!(payload["server"]["networks"][0]["uuid"], "n1");
        assert!(payload["server"].get("user_data").is_none());
        assert!(payload["server"].get("key_name").is_none());

        spec.user_data = Some("IyEvYmluL3No".into());
        spec.key_name = Some("deploy-key".into());
        let payload = spec.to_payload();
        assert_eq!(payload["server"]["user_data"], "IyEvYmluL3No");
        assert_eq!(payload["server"]["key_name"], "deploy-key");
    }
}
