pub mod config;
pub mod error;
pub mod resolver;
pub mod snapshot;
pub mod store;
pub mod uri;

pub use config::{EnforcementMode, HostConfig, LocationConfig, ScopeConfig, ServerConfig, Toggle};
pub use error::{ConfigError, EnforceError};
pub use resolver::{resolve, resolve_enabled, resolve_rate, EffectivePolicy, DEFAULT_RATE};
pub use snapshot::{ConfigSnapshot, PolicyRow, ScopeChain};
pub use store::ConfigStore;
pub use uri::normalize_path;
