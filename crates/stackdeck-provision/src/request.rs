//! Caller-supplied provisioning requests

use stackdeck_cloud::{Collection, Snapshot};

/// A resource picked by the caller, either by id or by exact name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Id(String),
    Name(String),
}

impl Selection {
    pub fn id(id: impl Into<String>) -> Self {
        Selection::Id(id.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Selection::Name(name.into())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Selection::Id(v) | Selection::Name(v) => v.trim().is_empty(),
        }
    }

    /// Underlying id, looked up in `snapshot`.
    ///
    /// Ids are only accepted if the snapshot knows them.
    pub fn resolve(&self, snapshot: &Snapshot, collection: Collection) -> Option<String> {
        match self {
            Selection::Id(id) => snapshot
                .contains_id(collection, id)
                .then(|| id.clone()),
            Selection::Name(name) => snapshot.find_id_by_name(collection, name),
        }
    }
}

fn filled(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Create a network, optionally with a subnet and a router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkRequest {
    pub network_name: String,
    pub subnet_name: Option<String>,
    pub cidr: Option<String>,
    pub auto_create_router: bool,
    pub router_name: Option<String>,
}

impl NetworkRequest {
    pub fn new(network_name: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
            ..Default::default()
        }
    }

    pub fn with_subnet(mut self, name: impl Into<String>, cidr: impl Into<String>) -> Self {
        self.subnet_name = Some(name.into());
        self.cidr = Some(cidr.into());
        self
    }

    pub fn with_router(mut self, name: Option<String>) -> Self {
        self.auto_create_router = true;
        self.router_name = name;
        self
    }

    /// Subnet name and CIDR, only when both are filled in
    pub fn subnet(&self) -> Option<(&str, &str)> {
        Some((filled(&self.subnet_name)?, filled(&self.cidr)?))
    }

    /// Explicit router name, else `<network_name>_router`
    pub fn router_name(&self) -> String {
        filled(&self.router_name)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_router", self.network_name))
    }
}

/// Floating IP to attach after the instance boots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FloatingIpChoice {
    #[default]
    Skip,
    Use {
        id: String,
        /// Address shown to the user, reported if the API omits it
        address: String,
    },
}

/// Boot an instance and optionally give it a floating IP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceRequest {
    pub instance_name: String,
    pub image: Option<Selection>,
    pub flavor: Option<Selection>,
    pub network: Option<Selection>,
    pub security_group: Option<String>,
    pub floating_ip: FloatingIpChoice,
    /// Plain-text cloud-init script
    pub user_script: Option<String>,
}

/// Required selections of an [`InstanceRequest`], all present
pub(crate) struct InstanceSelections<'a> {
    pub image: &'a Selection,
    pub flavor: &'a Selection,
    pub network: &'a Selection,
    pub security_group: &'a str,
}

impl InstanceRequest {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            ..Default::default()
        }
    }

    pub(crate) fn selections(&self) -> Option<InstanceSelections<'_>> {
        fn picked(selection: &Option<Selection>) -> Option<&Selection> {
            selection.as_ref().filter(|s| !s.is_blank())
        }
        Some(InstanceSelections {
            image: picked(&self.image)?,
            flavor: picked(&self.flavor)?,
            network: picked(&self.network)?,
            security_group: filled(&self.security_group)?,
        })
    }

    pub(crate) fn script(&self) -> Option<&str> {
        filled(&self.user_script)
    }
}
