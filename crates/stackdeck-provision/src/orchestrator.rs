//! Network and instance provisioning chains
//!
//! Each chain validates against the cached snapshot, issues its creation
//! calls in order and always ends with an inventory poll once anything may
//! have changed. Steps after the primary resource are best effort: a failure
//! is logged as a warning and nothing already created is rolled back.

use crate::error::{ProvisionError, Result};
use crate::report::{ChainKind, ChainOutcome, ChainReport, ChainState, CreatedResource};
use crate::request::{FloatingIpChoice, InstanceRequest, NetworkRequest};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use stackdeck_cloud::{
    Collection, InventoryCache, LogSink, PollOptions, ResourceClient, RouterSpec, ServerSpec,
    Snapshot, TokenManager,
};
use stackdeck_config::Settings;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wait between instance creation and floating IP association
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Account-level values baked into creation payloads
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub project_id: String,
    pub external_network_id: String,
    pub key_pair_name: Option<String>,
    pub settle_delay: Duration,
}

impl ProvisionSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            project_id: settings.credentials.project_id.clone(),
            external_network_id: settings.external_network_id.clone(),
            key_pair_name: settings.key_pair_name.clone(),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

/// Bookkeeping for one chain run
struct ChainRun {
    report: ChainReport,
    log: LogSink,
    started: Instant,
}

impl ChainRun {
    fn new(kind: ChainKind, log: LogSink) -> Self {
        Self {
            report: ChainReport::new(kind),
            log,
            started: Instant::now(),
        }
    }

    fn enter(&mut self, state: ChainState) {
        tracing::debug!("{} chain: {}", self.report.kind, state);
        self.report.reached = state;
    }

    fn created(&mut self, collection: Collection, id: &str) {
        self.report.created.push(CreatedResource {
            collection,
            id: id.to_string(),
        });
    }

    fn warn(&mut self, message: String) {
        self.log.warn(&message);
        self.report.warnings.push(message);
    }

    fn fail(&mut self, message: String) {
        self.log.error(&message);
        self.report.outcome = ChainOutcome::Failed;
        self.report.failed_at = Some(self.report.reached);
        self.report.error = Some(message);
    }

    /// Stop on `err`: validation errors reject, cloud errors fail.
    fn fail_with(&mut self, err: ProvisionError) {
        let rejected = err.is_validation();
        self.fail(err.to_string());
        if rejected {
            self.report.outcome = ChainOutcome::Rejected;
        }
    }

    fn reject(mut self, err: ProvisionError) -> ChainReport {
        self.fail_with(err);
        self.finish()
    }

    fn finish(mut self) -> ChainReport {
        if self.report.outcome == ChainOutcome::Completed && !self.report.warnings.is_empty() {
            self.report.outcome = ChainOutcome::CompletedWithWarnings;
        }
        self.report.duration_ms = self.started.elapsed().as_millis() as u64;
        tracing::info!(
            kind = %self.report.kind,
            outcome = ?self.report.outcome,
            duration_ms = self.report.duration_ms,
            "chain finished"
        );
        self.report
    }
}

fn describe_delay(delay: Duration) -> String {
    if delay.subsec_nanos() == 0 {
        format!("{} seconds", delay.as_secs())
    } else {
        format!("{:.1} seconds", delay.as_secs_f64())
    }
}

/// Runs provisioning chains against one cloud account
pub struct Orchestrator {
    tokens: Arc<TokenManager>,
    client: Arc<ResourceClient>,
    inventory: Arc<InventoryCache>,
    settings: ProvisionSettings,
    log: LogSink,
}

impl Orchestrator {
    pub fn new(
        tokens: Arc<TokenManager>,
        client: Arc<ResourceClient>,
        inventory: Arc<InventoryCache>,
        settings: ProvisionSettings,
        log: LogSink,
    ) -> Self {
        Self {
            tokens,
            client,
            inventory,
            settings,
            log,
        }
    }

    /// Wire up token manager, client and inventory for `settings`.
    pub fn from_settings(settings: &Settings, poll: PollOptions, log: LogSink) -> Self {
        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenManager::new(
            http.clone(),
            settings.endpoints.identity.clone(),
            settings.credentials.clone(),
            settings.token_cache_path(),
            log.clone(),
        ));
        let client = Arc::new(ResourceClient::new(
            http,
            settings.endpoints.clone(),
            log.clone(),
        ));
        let inventory = Arc::new(
            InventoryCache::new(
                tokens.clone(),
                client.clone(),
                settings.snapshot_path(),
                log.clone(),
            )
            .with_meta_path(settings.snapshot_meta_path())
            .with_options(poll),
        );
        Self::new(
            tokens,
            client,
            inventory,
            ProvisionSettings::from_settings(settings),
            log,
        )
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn inventory(&self) -> &Arc<InventoryCache> {
        &self.inventory
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    /// Trailing poll; `reached` keeps the last chain step.
    async fn refresh(&self, run: &mut ChainRun) -> Snapshot {
        tracing::debug!("{} chain: {}", run.report.kind, ChainState::Refreshing);
        let snapshot = self.inventory.poll().await;
        run.report.refreshed = true;
        snapshot
    }

    /// Create a network, then its subnet and router when requested.
    pub async fn run_network_chain(&self, request: NetworkRequest) -> ChainReport {
        let mut run = ChainRun::new(ChainKind::Network, self.log.clone());

        run.enter(ChainState::ValidatingName);
        let name = request.network_name.as_str();
        if name.trim().is_empty() {
            return run.reject(ProvisionError::EmptyField("Network name"));
        }
        if self.inventory.read().await.is_network_duplicate(name) {
            return run.reject(ProvisionError::Duplicate {
                kind: "Network",
                name: name.to_string(),
            });
        }

        self.network_steps(&mut run, &request).await;
        self.refresh(&mut run).await;
        run.finish()
    }

    async fn network_steps(&self, run: &mut ChainRun, request: &NetworkRequest) {
        let name = request.network_name.as_str();

        run.enter(ChainState::CreatingNetwork);
        let token = match self.tokens.get_token().await {
            Ok(token) => token,
            Err(e) => return run.fail_with(e.into()),
        };
        let Some(network_id) = self.client.create_network(&token, name).await else {
            return run.fail("Network creation failed.".to_string());
        };
        run.created(Collection::Networks, &network_id);
        self.log
            .plain(format!("Network creation successful. ID: {}", network_id));

        let Some((subnet_name, cidr)) = request.subnet() else {
            run.warn("Missing subnet info; only network created.".to_string());
            if request.auto_create_router {
                self.log
                    .info("Skipping router creation because subnet information is incomplete.");
            }
            return;
        };

        run.enter(ChainState::CreatingSubnet);
        let Some(subnet_id) = self
            .client
            .create_subnet(&token, subnet_name, &network_id, cidr)
            .await
        else {
            return run.warn("Subnet creation failed.".to_string());
        };
        run.created(Collection::Subnets, &subnet_id);
        self.log
            .plain(format!("Subnet creation successful. ID: {}", subnet_id));

        if request.auto_create_router {
            run.enter(ChainState::CreatingRouter);
            let router_name = request.router_name();
            let spec = RouterSpec {
                name: router_name.clone(),
                project_id: self.settings.project_id.clone(),
                external_network_id: self.settings.external_network_id.clone(),
            };
            match self.client.create_router(&token, &spec).await {
                Some(router_id) => {
                    run.created(Collection::Routers, &router_id);
                    if self
                        .client
                        .add_router_interface(&token, &router_id, &subnet_id)
                        .await
                        .is_some()
                    {
                        self.log.plain(format!(
                            "Router '{}' created and subnet attached. ID: {}",
                            router_name, router_id
                        ));
                    } else {
                        run.warn(format!(
                            "Router '{}' created but failed to attach subnet.",
                            router_name
                        ));
                    }
                }
                None => run.warn(format!("Failed to create router '{}'.", router_name)),
            }
        }

        run.report.clear_inputs = true;
    }

    /// Boot an instance, then attach a floating IP when one was chosen.
    pub async fn run_instance_chain(&self, request: InstanceRequest) -> ChainReport {
        let mut run = ChainRun::new(ChainKind::Instance, self.log.clone());

        run.enter(ChainState::ValidatingName);
        let name = request.instance_name.as_str();
        if name.trim().is_empty() {
            return run.reject(ProvisionError::EmptyField("Instance name"));
        }
        let snapshot = self.inventory.read().await;
        if snapshot.is_instance_duplicate(name) {
            return run.reject(ProvisionError::Duplicate {
                kind: "Instance",
                name: name.to_string(),
            });
        }

        run.enter(ChainState::ResolvingIds);
        let spec = match self.server_spec(&snapshot, &request) {
            Ok(spec) => spec,
            Err(e) => return run.reject(e),
        };

        self.instance_steps(&mut run, &spec, &request.floating_ip)
            .await;
        self.refresh(&mut run).await;
        run.finish()
    }

    /// Map the request's selections to ids in `snapshot`.
    fn server_spec(&self, snapshot: &Snapshot, request: &InstanceRequest) -> Result<ServerSpec> {
        let selections = request
            .selections()
            .ok_or(ProvisionError::MissingSelection)?;

        let image_id = selections.image.resolve(snapshot, Collection::Images);
        let flavor_id = selections.flavor.resolve(snapshot, Collection::Flavors);
        let network_id = selections.network.resolve(snapshot, Collection::Networks);
        let (Some(image_id), Some(flavor_id), Some(network_id)) =
            (image_id.clone(), flavor_id.clone(), network_id.clone())
        else {
            let fields = [("image", &image_id), ("flavor", &flavor_id), ("network", &network_id)]
                .into_iter()
                .filter(|(_, id)| id.is_none())
                .map(|(field, _)| field)
                .collect();
            return Err(ProvisionError::Unresolved { fields });
        };

        Ok(ServerSpec {
            name: request.instance_name.clone(),
            image_id,
            flavor_id,
            network_id,
            security_group: selections.security_group.to_string(),
            user_data: request.script().map(|script| BASE64.encode(script)),
            key_name: self.settings.key_pair_name.clone(),
        })
    }

    async fn instance_steps(
        &self,
        run: &mut ChainRun,
        spec: &ServerSpec,
        floating_ip: &FloatingIpChoice,
    ) {
        run.enter(ChainState::CreatingInstance);
        let token = match self.tokens.get_token().await {
            Ok(token) => token,
            Err(e) => return run.fail_with(e.into()),
        };
        let Some(instance_id) = self.client.create_server(&token, spec).await else {
            return run.fail("Instance creation failed.".to_string());
        };
        run.created(Collection::Servers, &instance_id);
        run.report.clear_inputs = true;
        self.log
            .plain(format!("Instance creation successful. ID: {}", instance_id));

        if let FloatingIpChoice::Use { id, address } = floating_ip {
            self.associate_floating_ip(run, &token, &instance_id, id, address)
                .await;
        }
    }

    async fn associate_floating_ip(
        &self,
        run: &mut ChainRun,
        token: &str,
        instance_id: &str,
        floating_ip_id: &str,
        shown_address: &str,
    ) {
        run.enter(ChainState::AssociatingFloatingIp);
        self.log.plain(format!(
            "Attempting to associate floating IP ID {} with instance {}...",
            floating_ip_id, instance_id
        ));
        self.log.plain(format!(
            "Waiting {} for instance networking to initialize...",
            describe_delay(self.settings.settle_delay)
        ));
        tokio::time::sleep(self.settings.settle_delay).await;

        self.log
            .plain("Refreshing cached inventory prior to floating IP association...");
        let refreshed = self.inventory.poll().await;

        let mut port_id = self
            .client
            .ports_for_device(token, instance_id)
            .await
            .into_iter()
            .map(|port| port.id)
            .find(|id| !id.is_empty());
        if port_id.is_none() {
            self.log
                .info("No ports returned from live query, falling back to refreshed cache.");
            port_id = refreshed.port_id_by_device(instance_id);
        }

        let Some(port_id) = port_id else {
            return run.warn(format!(
                "Could not determine port for instance {}; skipping floating IP assignment.",
                instance_id
            ));
        };

        match self
            .client
            .associate_floating_ip(token, floating_ip_id, &port_id)
            .await
        {
            Some(body) => {
                let address = body
                    .pointer("/floatingip/floating_ip_address")
                    .and_then(|v| v.as_str())
                    .filter(|a| !a.is_empty())
                    .unwrap_or(shown_address)
                    .to_string();
                self.log
                    .plain(format!("Floating IP {} associated successfully.", address));
                run.report.floating_ip_address = Some(address);
            }
            None => run.warn(format!(
                "Failed to associate floating IP {} with port {}.",
                floating_ip_id, port_id
            )),
        }
    }
}
