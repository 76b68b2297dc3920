//! stackdeck cloud layer
//!
//! Everything that talks to the OpenStack APIs:
//!
//! - [`TokenManager`]: identity tokens cached on disk until they expire
//! - [`ResourceClient`]: authenticated calls against compute and network
//! - [`InventoryCache`]: the poll engine and the `openstack_data.json` snapshot
//! - [`LogSink`]: the tagged progress stream every component writes to
//!
//! ```text
//! InventoryCache ──▶ ResourceClient ──▶ compute / network APIs
//!       │                  ▲
//!       │                  │ X-Auth-Token
//!       │            TokenManager ──▶ token_cache.json
//!       ▼
//! openstack_data.json (+ .meta.json, poll.log)
//! ```

pub mod client;
pub mod error;
pub mod inventory;
pub mod log;
pub mod model;
mod persist;
pub mod poll_log;
pub mod token;

// Re-exports
pub use client::{ApiRequest, ResourceClient, RouterSpec, ServerSpec};
pub use error::{CloudError, Result};
pub use inventory::{
    CollectionStatus, Freshness, InventoryCache, PollOptions, PollPolicy, Snapshot,
};
pub use log::{LogLine, LogSink, LogTag};
pub use model::{Collection, Flavor, FloatingIp, NamedResource, Port, Subsystem};
pub use poll_log::PollLog;
pub use token::{Token, TokenManager};
