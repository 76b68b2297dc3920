//! stackdeck configuration
//!
//! Account secrets, subsystem endpoints and local data paths are supplied
//! out-of-band through environment variables (optionally from a `.env` file
//! in the working directory).
//!
//! | Variable | Required | Meaning |
//! |---|---|---|
//! | `ACCOUNT_ID` | yes | identity user id |
//! | `ACCOUNT_PASSWORD_BASE64` | yes | base64 of the UTF-8 password |
//! | `OPENSTACK_PROJECT_ID` | yes | project the token is scoped to |
//! | `OPENSTACK_EXTERNAL_NETWORK_ID` | no | router gateway network |
//! | `KEY_PAIR_NAME_BASE64` | no | key pair injected into new instances |
//! | `OPENSTACK_IDENTITY_URL` / `_COMPUTE_URL` / `_NETWORK_URL` | no | base URL overrides |
//! | `STACKDECK_DATA_DIR` | no | where cache files live (default: cwd) |

pub mod error;

pub use error::*;

use base64::Engine;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_IDENTITY_URL: &str = "https://cloud-identity.uitiot.vn/v3";
pub const DEFAULT_COMPUTE_URL: &str = "https://cloud-compute.uitiot.vn/v2.1";
pub const DEFAULT_NETWORK_URL: &str = "https://cloud-network.uitiot.vn/v2.0";
pub const DEFAULT_EXTERNAL_NETWORK_ID: &str = "c3455e8f-ea16-4f5d-ad5e-5c4292015a0d";

const TOKEN_CACHE_FILE: &str = "token_cache.json";
const SNAPSHOT_FILE: &str = "openstack_data.json";
const SNAPSHOT_META_FILE: &str = "openstack_data.meta.json";
const POLL_LOG_FILE: &str = "poll.log";

/// Load `.env` from the working directory if there is one.
///
/// Variables already present in the process environment win.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => tracing::debug!(".env not found, using process environment"),
        Err(e) => tracing::warn!("Ignoring unreadable .env: {}", e),
    }
}

/// Decode a base64-encoded UTF-8 secret.
pub fn decode_secret(name: &str, encoded: &str) -> Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ConfigError::InvalidSecret {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

    String::from_utf8(bytes).map_err(|e| ConfigError::InvalidSecret {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Long-lived account secrets used for the password grant.
#[derive(Clone)]
pub struct Credentials {
    pub account_id: String,
    pub password: String,
    pub project_id: String,
}

impl Credentials {
    pub fn new(
        account_id: impl Into<String>,
        password: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            password: password.into(),
            project_id: project_id.into(),
        }
    }

    /// Read credentials through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let account_id = required(&lookup, "ACCOUNT_ID")?;
        let encoded = required(&lookup, "ACCOUNT_PASSWORD_BASE64")?;
        let password = decode_secret("ACCOUNT_PASSWORD_BASE64", &encoded)?;
        let project_id = required(&lookup, "OPENSTACK_PROJECT_ID")?;

        Ok(Self {
            account_id,
            password,
            project_id,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("password", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Base URLs of the three cloud subsystems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub identity: String,
    pub compute: String,
    pub network: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY_URL.to_string(),
            compute: DEFAULT_COMPUTE_URL.to_string(),
            network: DEFAULT_NETWORK_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Point every subsystem at `<base>/identity`, `<base>/compute`, `<base>/network`.
    pub fn under(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            identity: format!("{}/identity", base),
            compute: format!("{}/compute", base),
            network: format!("{}/network", base),
        }
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let pick = |name: &str, fallback: String| {
            optional(lookup, name)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(fallback)
        };
        Self {
            identity: pick("OPENSTACK_IDENTITY_URL", defaults.identity),
            compute: pick("OPENSTACK_COMPUTE_URL", defaults.compute),
            network: pick("OPENSTACK_NETWORK_URL", defaults.network),
        }
    }
}

/// Everything the core needs to talk to one cloud account.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub endpoints: Endpoints,
    pub external_network_id: String,
    pub key_pair_name: Option<String>,
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn new(credentials: Credentials, endpoints: Endpoints, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            credentials,
            endpoints,
            external_network_id: DEFAULT_EXTERNAL_NETWORK_ID.to_string(),
            key_pair_name: None,
            data_dir: data_dir.into(),
        }
    }

    /// Load `.env` and read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let credentials = Credentials::from_lookup(&lookup)?;
        let endpoints = Endpoints::from_lookup(&lookup);

        let external_network_id = optional(&lookup, "OPENSTACK_EXTERNAL_NETWORK_ID")
            .unwrap_or_else(|| DEFAULT_EXTERNAL_NETWORK_ID.to_string());

        let key_pair_name = optional(&lookup, "KEY_PAIR_NAME_BASE64")
            .map(|encoded| decode_secret("KEY_PAIR_NAME_BASE64", &encoded))
            .transpose()?;

        let data_dir = match optional(&lookup, "STACKDECK_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()?,
        };

        Ok(Self {
            credentials,
            endpoints,
            external_network_id,
            key_pair_name,
            data_dir,
        })
    }

    pub fn token_cache_path(&self) -> PathBuf {
        self.data_dir.join(TOKEN_CACHE_FILE)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    pub fn snapshot_meta_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_META_FILE)
    }

    pub fn poll_log_path(&self) -> PathBuf {
        self.data_dir.join(POLL_LOG_FILE)
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    optional(lookup, name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}
