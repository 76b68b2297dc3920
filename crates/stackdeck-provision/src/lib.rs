//! stackdeck provisioning
//!
//! Two chains build on the cloud layer:
//!
//! - **network**: validate name → network → subnet → router (optional) → refresh
//! - **instance**: validate name → resolve ids → instance → floating IP (optional) → refresh
//!
//! [`Orchestrator`] runs them in place and returns a [`ChainReport`].
//! [`Dispatcher`] runs them (and inventory refreshes) as background tasks for
//! an interactive front end.

pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod request;

// Re-exports
pub use dispatch::{ChainHandle, ControlState, Dispatcher};
pub use error::{ProvisionError, Result};
pub use orchestrator::{DEFAULT_SETTLE_DELAY, Orchestrator, ProvisionSettings};
pub use report::{ChainKind, ChainOutcome, ChainReport, ChainState, CreatedResource};
pub use request::{FloatingIpChoice, InstanceRequest, NetworkRequest, Selection};
