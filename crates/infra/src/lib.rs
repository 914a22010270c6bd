//! Infrastructure layer: backend capabilities, provisioning sagas, session
//! resolution and configuration.

pub mod config;
pub mod faults;
pub mod identity;
pub mod object_store;
pub mod provisioner;
pub mod record_store;
pub mod saga;
pub mod session;

pub use config::{ConfigError, HrConfig};
pub use provisioner::Provisioner;
pub use saga::{ProvisioningError, SagaResult};
pub use session::SessionResolver;
