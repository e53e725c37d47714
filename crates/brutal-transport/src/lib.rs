pub use brutal_core::{ConfigSnapshot, ConfigStore, EffectivePolicy, EnforceError};
pub mod enforcer;
pub mod hook;
pub mod params;
pub mod request;
pub mod server;

pub use enforcer::{enforce, CongestionSocket, Enforcement, KernelSocket};
pub use hook::before_serving;
pub use params::CongestionParams;
pub use server::BrutalServer;
