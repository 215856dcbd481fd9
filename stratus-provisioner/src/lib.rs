pub mod features;
pub mod shared;

#[cfg(test)]
mod test_support;

pub use features::instance_management::controller::InstanceController;
pub use features::instance_management::instance::Instance;
pub use features::instance_management::service::InstanceOrchestrator;
pub use shared::config::ProvisionerConfig;
pub use shared::error::{ProvisionerError, ProvisionerResult};
