//! VM Operator - virtual machine class pinning and endpoint resolution

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vm_operator::controller::{class_instance, endpoints};
use vm_operator::crd::{
    VirtualMachine, VirtualMachineClass, VirtualMachineClassInstance, VirtualMachineEndpoints,
};
use vm_operator::retry::{retry_with_backoff, RetryConfig};

/// VM Operator - class pinning and endpoint resolution for virtual machines
#[derive(Parser, Debug)]
#[command(name = "vm-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Revalidation interval for endpoint resolution, in seconds
    #[arg(long, default_value_t = vm_operator::DEFAULT_RESYNC_SECS)]
    resync_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        print_crds()?;
        return Ok(());
    }

    run_controllers(Duration::from_secs(cli.resync_secs)).await
}

/// Print all CRD manifests as a multi-document YAML stream
fn print_crds() -> anyhow::Result<()> {
    let crds = [
        serde_yaml::to_string(&VirtualMachine::crd())?,
        serde_yaml::to_string(&VirtualMachineClass::crd())?,
        serde_yaml::to_string(&VirtualMachineClassInstance::crd())?,
        serde_yaml::to_string(&VirtualMachineEndpoints::crd())?,
    ];
    println!("{}", crds.join("---\n"));
    Ok(())
}

/// Ensure all operator CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply,
/// so the CRD versions always match the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(vm_operator::FIELD_MANAGER).force();

    let manifests = [
        ("virtualmachines.vmoperator.dev", VirtualMachine::crd()),
        (
            "virtualmachineclasses.vmoperator.dev",
            VirtualMachineClass::crd(),
        ),
        (
            "virtualmachineclassinstances.vmoperator.dev",
            VirtualMachineClassInstance::crd(),
        ),
        (
            "virtualmachineendpoints.vmoperator.dev",
            VirtualMachineEndpoints::crd(),
        ),
    ];

    for (name, manifest) in &manifests {
        tracing::info!(crd = name, "Installing CRD...");
        crds.patch(name, &params, &Patch::Apply(manifest))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }

    tracing::info!("All CRDs installed/updated");
    Ok(())
}

/// Run both reconciliation loops until shutdown
async fn run_controllers(resync: Duration) -> anyhow::Result<()> {
    tracing::info!("VM operator starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    // The API server may still be coming up when the operator pod starts.
    let install_client = client.clone();
    retry_with_backoff(&RetryConfig::startup(), "install CRDs", || {
        let client = install_client.clone();
        async move { ensure_crds_installed(&client).await.map_err(|e| e.to_string()) }
    })
    .await
    .map_err(|e| anyhow::anyhow!("CRD installation failed: {}", e))?;

    let vms: Api<VirtualMachine> = Api::all(client.clone());
    let all_endpoints: Api<VirtualMachineEndpoints> = Api::all(client.clone());
    let instances: Api<VirtualMachineClassInstance> = Api::all(client.clone());

    let pinner_ctx = Arc::new(class_instance::Context::new(client.clone()));
    let resolver_ctx = Arc::new(endpoints::Context::new(client, resync));

    tracing::info!("Starting controllers...");
    tracing::info!("  - VirtualMachine class instance pinner");
    tracing::info!("  - VirtualMachineEndpoints resolver");

    // The pinner watches VMs and owns the instances it creates, so instance
    // deletion triggers a re-pin of the owning VM.
    let pinner = Controller::new(vms, WatcherConfig::default())
        .owns(instances, WatcherConfig::default())
        .shutdown_on_signal()
        .run(
            class_instance::reconcile,
            class_instance::error_policy,
            pinner_ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Class instance reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Class instance reconciliation error");
                }
            }
        });

    let resolver = Controller::new(all_endpoints, WatcherConfig::default())
        .shutdown_on_signal()
        .run(endpoints::reconcile, endpoints::error_policy, resolver_ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Endpoint reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Endpoint reconciliation error");
                }
            }
        });

    tokio::select! {
        _ = pinner => {
            tracing::info!("Class instance controller completed");
        }
        _ = resolver => {
            tracing::info!("Endpoint controller completed");
        }
    }

    tracing::info!("VM operator shutting down");
    Ok(())
}
