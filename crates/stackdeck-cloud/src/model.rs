//! Resource collections and the typed views read out of a snapshot

use serde::{Deserialize, Serialize};

/// Cloud subsystem serving a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Compute,
    Network,
}

/// The fixed set of collections captured in every snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Images,
    Flavors,
    Keypairs,
    Networks,
    Servers,
    SecurityGroups,
    Routers,
    Subnets,
    FloatingIps,
    Ports,
}

impl Collection {
    /// Poll order
    pub const ALL: [Collection; 10] = [
        Collection::Images,
        Collection::Flavors,
        Collection::Keypairs,
        Collection::Networks,
        Collection::Servers,
        Collection::SecurityGroups,
        Collection::Routers,
        Collection::Subnets,
        Collection::FloatingIps,
        Collection::Ports,
    ];

    /// Key of the collection in the snapshot document
    pub fn key(&self) -> &'static str {
        match self {
            Collection::Images => "images",
            Collection::Flavors => "flavors",
            Collection::Keypairs => "keypairs",
            Collection::Networks => "networks",
            Collection::Servers => "servers",
            Collection::SecurityGroups => "security_groups",
            Collection::Routers => "routers",
            Collection::Subnets => "subnets",
            Collection::FloatingIps => "floating_ips",
            Collection::Ports => "ports",
        }
    }

    /// Key of the item array inside the list response body
    pub fn items_key(&self) -> &'static str {
        match self {
            Collection::FloatingIps => "floatingips",
            other => other.key(),
        }
    }

    pub fn subsystem(&self) -> Subsystem {
        match self {
            Collection::Images
            | Collection::Flavors
            | Collection::Keypairs
            | Collection::Servers => Subsystem::Compute,
            _ => Subsystem::Network,
        }
    }

    /// List path relative to the subsystem base URL
    pub fn list_path(&self) -> &'static str {
        match self {
            Collection::Images => "/images",
            Collection::Flavors => "/flavors/detail",
            Collection::Keypairs => "/os-keypairs",
            Collection::Networks => "/networks",
            Collection::Servers => "/servers",
            Collection::SecurityGroups => "/security-groups",
            Collection::Routers => "/routers",
            Collection::Subnets => "/subnets",
            Collection::FloatingIps => "/floatingips",
            Collection::Ports => "/ports",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Any record with an id and a name (image, network, server, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vcpus: Option<u32>,
    /// MiB
    #[serde(default)]
    pub ram: Option<u64>,
    /// GiB
    #[serde(default)]
    pub disk: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingIp {
    pub id: String,
    #[serde(default)]
    pub floating_ip_address: Option<String>,
    /// Set when the address is already associated
    #[serde(default)]
    pub port_id: Option<String>,
}

impl FloatingIp {
    pub fn is_associated(&self) -> bool {
        self.port_id.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    /// Owning instance id
    #[serde(default)]
    pub device_id: String,
}
