use std::sync::Arc;
use stratus_provisioner::features::compute::repo::{
    InMemoryComputeClient, InMemoryLoadBalancerClient,
};
use stratus_provisioner::shared::types::CreateVmRequest;
use stratus_provisioner::{InstanceController, InstanceOrchestrator, ProvisionerConfig};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stratus_provisioner=info,info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let request_path = std::env::args()
        .nth(1)
        .ok_or("usage: stratus-provisioner <create-vm-request.json>")?;

    let config = ProvisionerConfig::from_env()?;
    let raw_request = std::fs::read_to_string(&request_path)?;
    let mut request: CreateVmRequest = serde_json::from_str(&raw_request)?;
    if request.options.region.is_empty() {
        request.options.region = config.region.clone();
    }

    let zones = simulated_zones(&config.region);
    info!(region = %config.region, zones = ?zones, "Starting Stratus provisioner against simulated region");

    let compute = Arc::new(InMemoryComputeClient::new(config.region.clone(), zones));
    let load_balancers = Arc::new(InMemoryLoadBalancerClient::new());
    let orchestrator = InstanceOrchestrator::from_config(compute, load_balancers, config);
    let controller = InstanceController::new(Arc::new(orchestrator));

    match controller.create_vm(request).await {
        Ok(vm) => {
            info!(
                instance_id = %vm.instance_id,
                availability_zone = %vm.availability_zone,
                state = %vm.state,
                "VM created"
            );
            println!("{}", serde_json::to_string_pretty(&vm)?);
            Ok(())
        }
        Err(response) => {
            error!(
                error_code = %response.error_code,
                ok_to_retry = response.ok_to_retry,
                "{}",
                response.message
            );
            std::process::exit(1);
        }
    }
}

/// Zones of the simulated region, from `STRATUS_SIMULATED_ZONES` or
/// `<region>a..c`.
fn simulated_zones(region: &str) -> Vec<String> {
    match std::env::var("STRATUS_SIMULATED_ZONES") {
        Ok(zones) => zones
            .split(',')
            .map(str::trim)
            .filter(|zone| !zone.is_empty())
            .map(ToString::to_string)
            .collect(),
        Err(_) => ["a", "b", "c"]
            .iter()
            .map(|suffix| format!("{region}{suffix}"))
            .collect(),
    }
}
