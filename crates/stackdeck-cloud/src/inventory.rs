//! Inventory snapshot and the poll engine that produces it
//!
//! A poll cycle authenticates once, lists the ten [`Collection`]s one after
//! another and replaces `openstack_data.json` with the result in a single
//! write. A collection that failed to load is stored as `null` (or, with
//! [`PollPolicy::KeepLastKnownGood`], keeps its previous value). Per-collection
//! freshness is kept in a sidecar `openstack_data.meta.json`.

use crate::client::ResourceClient;
use crate::error::CloudError;
use crate::log::{LogSink, LogTag};
use crate::model::{Collection, Flavor, FloatingIp, NamedResource, Port};
use crate::persist::{read_json_lenient, write_json_atomic};
use crate::poll_log::PollLog;
use crate::token::TokenManager;
use chrono::{DateTime, Local, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Point-in-time capture of every polled collection.
///
/// Serialized as `{ "<collection>": <raw list response> | null, ... }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    collections: BTreeMap<String, Option<Value>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a collection body; `None` marks a failed fetch.
    pub fn set(&mut self, collection: Collection, body: Option<Value>) {
        self.collections.insert(collection.key().to_string(), body);
    }

    /// Raw body of a collection, `None` when absent or failed
    pub fn get(&self, collection: Collection) -> Option<&Value> {
        self.collections
            .get(collection.key())
            .and_then(|v| v.as_ref())
    }

    /// Whether the collection was recorded (successfully or not)
    pub fn contains(&self, collection: Collection) -> bool {
        self.collections.contains_key(collection.key())
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Collections stored as `null`
    pub fn failed_collections(&self) -> Vec<Collection> {
        Collection::ALL
            .into_iter()
            .filter(|c| matches!(self.collections.get(c.key()), Some(None)))
            .collect()
    }

    /// Raw items of a collection (`body[items_key]`), empty if unavailable
    pub fn items(&self, collection: Collection) -> &[Value] {
        self.get(collection)
            .and_then(|body| body.get(collection.items_key()))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Items decoded as `T`, skipping entries that do not fit
    pub fn records<T: DeserializeOwned>(&self, collection: Collection) -> Vec<T> {
        self.items(collection)
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect()
    }

    pub fn named(&self, collection: Collection) -> Vec<NamedResource> {
        self.records(collection)
    }

    /// Names in snapshot order
    pub fn names(&self, collection: Collection) -> Vec<String> {
        self.named(collection).into_iter().map(|r| r.name).collect()
    }

    /// Id of the first record whose name matches exactly
    pub fn find_id_by_name(&self, collection: Collection, name: &str) -> Option<String> {
        self.named(collection)
            .into_iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
    }

    pub fn contains_id(&self, collection: Collection, id: &str) -> bool {
        self.named(collection).iter().any(|r| r.id == id)
    }

    pub fn is_network_duplicate(&self, name: &str) -> bool {
        self.find_id_by_name(Collection::Networks, name).is_some()
    }

    pub fn is_instance_duplicate(&self, name: &str) -> bool {
        self.find_id_by_name(Collection::Servers, name).is_some()
    }

    pub fn flavors(&self) -> Vec<Flavor> {
        self.records(Collection::Flavors)
    }

    /// Floating IPs not yet associated with any port
    pub fn available_floating_ips(&self) -> Vec<FloatingIp> {
        self.records::<FloatingIp>(Collection::FloatingIps)
            .into_iter()
            .filter(|ip| !ip.is_associated())
            .collect()
    }

    /// First cached port owned by `device_id`
    pub fn port_id_by_device(&self, device_id: &str) -> Option<String> {
        if device_id.is_empty() {
            return None;
        }
        self.records::<Port>(Collection::Ports)
            .into_iter()
            .find(|p| p.device_id == device_id)
            .map(|p| p.id)
    }
}

/// What to store for a collection whose fetch failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollPolicy {
    /// Store `null`; the previous data is dropped
    #[default]
    MaskFailures,
    /// Keep the previous cycle's body and mark it stale
    KeepLastKnownGood,
}

/// Freshness of one collection in the current snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStatus {
    /// When the stored data was fetched
    pub fetched_at: Option<DateTime<Utc>>,
    /// Data is carried over from an earlier cycle
    pub stale: bool,
    pub last_error: Option<String>,
}

/// Sidecar describing the snapshot's per-collection freshness
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freshness {
    pub polled_at: Option<DateTime<Utc>>,
    pub collections: BTreeMap<String, CollectionStatus>,
}

impl Freshness {
    pub fn get(&self, collection: Collection) -> Option<&CollectionStatus> {
        self.collections.get(collection.key())
    }

    fn set(&mut self, collection: Collection, status: CollectionStatus) {
        self.collections.insert(collection.key().to_string(), status);
    }
}

/// Poll engine knobs
#[derive(Debug, Clone, Default)]
pub struct PollOptions {
    /// Echo every poll line to the console stream (failures always are)
    pub verbose: bool,
    pub policy: PollPolicy,
    pub audit_log: Option<PollLog>,
}

/// Lines of one poll cycle, fanned out to the console and the audit log
struct PollCycle {
    log: LogSink,
    verbose: bool,
    lines: Vec<(DateTime<Local>, String)>,
}

impl PollCycle {
    fn new(log: LogSink, verbose: bool) -> Self {
        Self {
            log,
            verbose,
            lines: Vec::new(),
        }
    }

    fn record(&mut self, message: String, failure: bool) {
        let text = format!("[poll] {}", message);
        if self.verbose || failure {
            self.log.tagged(LogTag::Poll, &message);
        } else {
            tracing::debug!("{}", text);
        }
        self.lines.push((Local::now(), text));
    }

    fn line(&mut self, message: impl Into<String>) {
        self.record(message.into(), false);
    }

    fn failure(&mut self, message: impl Into<String>) {
        self.record(message.into(), true);
    }
}

fn describe_failure(err: &CloudError) -> String {
    match err {
        CloudError::Api { status, body, .. } => format!("Status: {}, Body: {}", status, body),
        other => other.to_string(),
    }
}

/// Reads and refreshes the on-disk inventory snapshot
pub struct InventoryCache {
    tokens: Arc<TokenManager>,
    client: Arc<ResourceClient>,
    snapshot_path: PathBuf,
    meta_path: PathBuf,
    options: PollOptions,
    log: LogSink,
}

impl InventoryCache {
    pub fn new(
        tokens: Arc<TokenManager>,
        client: Arc<ResourceClient>,
        snapshot_path: impl AsRef<Path>,
        log: LogSink,
    ) -> Self {
        let snapshot_path = snapshot_path.as_ref().to_path_buf();
        let meta_path = snapshot_path.with_extension("meta.json");
        Self {
            tokens,
            client,
            snapshot_path,
            meta_path,
            options: PollOptions::default(),
            log,
        }
    }

    pub fn with_options(mut self, options: PollOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_meta_path(mut self, meta_path: impl AsRef<Path>) -> Self {
        self.meta_path = meta_path.as_ref().to_path_buf();
        self
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    /// Persisted snapshot; empty when missing or unreadable
    pub async fn read(&self) -> Snapshot {
        read_json_lenient(&self.snapshot_path)
            .await
            .unwrap_or_default()
    }

    /// Persisted freshness sidecar; empty when missing or unreadable
    pub async fn freshness(&self) -> Freshness {
        read_json_lenient(&self.meta_path).await.unwrap_or_default()
    }

    /// Cached snapshot if one is on disk, otherwise a fresh poll
    pub async fn load_or_poll(&self) -> Snapshot {
        match read_json_lenient::<Snapshot>(&self.snapshot_path).await {
            Some(snapshot) => {
                self.log.plain("Data loaded from cache.");
                snapshot
            }
            None => {
                self.log
                    .plain("Cached data not found. Polling from OpenStack API...");
                self.poll().await
            }
        }
    }

    /// Run one poll cycle and persist the result.
    ///
    /// Never fails: a collection that cannot be fetched is degraded for this
    /// cycle only. If authentication fails the cycle is abandoned, the file on
    /// disk is left untouched and the existing snapshot is returned.
    pub async fn poll(&self) -> Snapshot {
        let mut cycle = PollCycle::new(self.log.clone(), self.options.verbose);

        cycle.line("Attempting to get OpenStack token...");
        let token = match self.tokens.get_token().await {
            Ok(token) => token,
            Err(e) => {
                cycle.failure(format!("An error occurred: {}", e));
                self.finish(cycle).await;
                return self.read().await;
            }
        };
        cycle.line("Token acquired successfully.");

        let (previous, previous_meta) = match self.options.policy {
            PollPolicy::KeepLastKnownGood => (self.read().await, self.freshness().await),
            PollPolicy::MaskFailures => (Snapshot::new(), Freshness::default()),
        };

        let mut snapshot = Snapshot::new();
        let mut meta = Freshness {
            polled_at: Some(Utc::now()),
            collections: BTreeMap::new(),
        };

        for collection in Collection::ALL {
            let url = self
                .client
                .url(collection.subsystem(), collection.list_path());
            cycle.line(format!("Polling {} from {}...", collection, url));

            match self.client.list(&token, collection).await {
                Ok(body) => {
                    cycle.line(format!("Successfully fetched {}.", collection));
                    snapshot.set(collection, Some(body));
                    meta.set(
                        collection,
                        CollectionStatus {
                            fetched_at: Some(Utc::now()),
                            stale: false,
                            last_error: None,
                        },
                    );
                }
                Err(e) => {
                    let reason = describe_failure(&e);
                    cycle.failure(format!("Failed to fetch {}. {}", collection, reason));

                    match previous.get(collection) {
                        Some(carried) if self.options.policy == PollPolicy::KeepLastKnownGood => {
                            snapshot.set(collection, Some(carried.clone()));
                            meta.set(
                                collection,
                                CollectionStatus {
                                    fetched_at: previous_meta
                                        .get(collection)
                                        .and_then(|s| s.fetched_at),
                                    stale: true,
                                    last_error: Some(reason),
                                },
                            );
                        }
                        _ => {
                            snapshot.set(collection, None);
                            meta.set(
                                collection,
                                CollectionStatus {
                                    fetched_at: None,
                                    stale: false,
                                    last_error: Some(reason),
                                },
                            );
                        }
                    }
                }
            }
        }

        cycle.line(format!(
            "Writing all resource data to {}...",
            self.snapshot_path.display()
        ));
        match write_json_atomic(&self.snapshot_path, &snapshot).await {
            Ok(()) => {
                if let Err(e) = write_json_atomic(&self.meta_path, &meta).await {
                    tracing::warn!("Failed to write {}: {}", self.meta_path.display(), e);
                }
                cycle.line("Polling complete. Data saved.");
            }
            Err(e) => cycle.failure(format!("An error occurred: {}", e)),
        }

        self.finish(cycle).await;
        snapshot
    }

    async fn finish(&self, cycle: PollCycle) {
        if let Some(audit) = &self.options.audit_log
            && let Err(e) = audit.append_cycle(&cycle.lines).await
        {
            tracing::warn!("Failed to append poll log {}: {}", audit.path().display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn networks_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.set(
            Collection::Networks,
            Some(json!({"networks": [{"id": "n1", "name": "net1"}]})),
        );
        snapshot
    }

    #[test]
    fn test_duplicate_detection_is_exact() {
        let snapshot = networks_snapshot();
        assert!(snapshot.is_network_duplicate("net1"));
        assert!(!snapshot.is_network_duplicate("NET1"));
        assert!(!snapshot.is_network_duplicate("net"));
        assert!(!snapshot.is_instance_duplicate("net1"));
    }

    #[test]
    fn test_serialized_shape() {
        let mut snapshot = networks_snapshot();
        snapshot.set(Collection::Ports, None);

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["networks"]["networks"][0]["id"], "n1");
        assert!(value["ports"].is_null());
        assert!(value.as_object().unwrap().contains_key("ports"));

        let back: Snapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.failed_collections(), vec![Collection::Ports]);
    }

    #[test]
    fn test_null_collection_reads_as_empty() {
        let snapshot: Snapshot =
            serde_json::from_value(json!({"networks": null, "servers": {"servers": "oops"}})).unwrap();
        assert!(snapshot.items(Collection::Networks).is_empty());
        assert!(snapshot.items(Collection::Servers).is_empty());
        assert!(snapshot.items(Collection::Images).is_empty());
        assert!(!snapshot.is_network_duplicate("anything"));
    }

    #[test]
    fn test_available_floating_ips() {
        let mut snapshot = Snapshot::new();
        snapshot.set(
            Collection::FloatingIps,
            Some(json!({"floatingips": [
                {"id": "f1", "floating_ip_address": "203.0.113.10", "port_id": null},
                {"id": "f2", "floating_ip_address": "203.0.113.11", "port_id": "p9"},
                {"id": "f3", "floating_ip_address": "203.0.113.12"}
            ]})),
        );
        let ids: Vec<String> = snapshot
            .available_floating_ips()
            .into_iter()
            .map(|ip| ip.id)
            .collect();
        assert_eq!(ids, vec!["f1", "f3"]);
    }

    #[test]
    fn test_port_lookup_by_device() {
        let mut snapshot = Snapshot::new();
        snapshot.set(
            Collection::Ports,
            Some(json!({"ports": [
                {"id": "p1", "device_id": "srv-0"},
                {"id": "p2", "device_id": "srv-1"},
                {"id": "p3", "device_id": "srv-1"}
            ]})),
        );
        assert_eq!(snapshot.port_id_by_device("srv-1").as_deref(), Some("p2"));
        assert_eq!(snapshot.port_id_by_device("srv-2"), None);
        assert_eq!(snapshot.port_id_by_device(""), None);
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let mut snapshot = Snapshot::new();
        snapshot.set(
            Collection::Images,
            Some(json!({"images": [{"name": "no-id"}, {"id": "img-1", "name": "ubuntu"}]})),
        );
        assert_eq!(snapshot.names(Collection::Images), vec!["ubuntu"]);
        assert!(snapshot.contains_id(Collection::Images, "img-1"));
        assert_eq!(
            snapshot.find_id_by_name(Collection::Images, "ubuntu").as_deref(),
            Some("img-1")
        );
    }
}
