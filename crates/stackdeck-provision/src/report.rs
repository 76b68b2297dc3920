//! Chain outcome reporting

use serde::{Deserialize, Serialize};
use stackdeck_cloud::Collection;

/// Which chain produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    Network,
    Instance,
}

impl std::fmt::Display for ChainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainKind::Network => write!(f, "network"),
            ChainKind::Instance => write!(f, "instance"),
        }
    }
}

/// Steps of the provisioning chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    Idle,
    ValidatingName,
    ResolvingIds,
    CreatingNetwork,
    CreatingSubnet,
    CreatingRouter,
    CreatingInstance,
    AssociatingFloatingIp,
    Refreshing,
}

impl std::fmt::Display for ChainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChainState::Idle => "idle",
            ChainState::ValidatingName => "validating-name",
            ChainState::ResolvingIds => "resolving-ids",
            ChainState::CreatingNetwork => "creating-network",
            ChainState::CreatingSubnet => "creating-subnet",
            ChainState::CreatingRouter => "creating-router",
            ChainState::CreatingInstance => "creating-instance",
            ChainState::AssociatingFloatingIp => "associating-floating-ip",
            ChainState::Refreshing => "refreshing",
        };
        f.write_str(name)
    }
}

/// How a chain ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainOutcome {
    /// Every requested step succeeded
    Completed,
    /// The primary resource exists but an optional step was skipped or failed
    CompletedWithWarnings,
    /// Validation stopped the chain before any call
    Rejected,
    /// The primary resource could not be created
    Failed,
}

/// A resource created by a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResource {
    pub collection: Collection,
    pub id: String,
}

/// Result of one chain run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub kind: ChainKind,

    /// Last chain step entered; the trailing refresh does not count
    pub reached: ChainState,

    pub outcome: ChainOutcome,

    /// Step at which the chain was rejected or failed
    pub failed_at: Option<ChainState>,

    /// Resources left in place, in creation order
    pub created: Vec<CreatedResource>,

    pub warnings: Vec<String>,

    pub error: Option<String>,

    /// Input fields should be cleared by the caller
    pub clear_inputs: bool,

    /// Address of the associated floating IP
    pub floating_ip_address: Option<String>,

    /// A post-chain inventory poll ran
    pub refreshed: bool,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ChainReport {
    pub fn new(kind: ChainKind) -> Self {
        Self {
            kind,
            reached: ChainState::Idle,
            outcome: ChainOutcome::Completed,
            failed_at: None,
            created: Vec::new(),
            warnings: Vec::new(),
            error: None,
            clear_inputs: false,
            floating_ip_address: None,
            refreshed: false,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            ChainOutcome::Completed | ChainOutcome::CompletedWithWarnings
        )
    }

    /// Id of the first created resource in `collection`
    pub fn created_id(&self, collection: Collection) -> Option<&str> {
        self.created
            .iter()
            .find(|r| r.collection == collection)
            .map(|r| r.id.as_str())
    }
}
