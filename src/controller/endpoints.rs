//! VirtualMachineEndpoints resolution controller
//!
//! This module implements the reconciliation logic that expands declarative
//! endpoint subsets into concrete (address, port) pairs and validates every
//! claimed address against the authoritative VM state. Resolution is a pure
//! function from (spec, VM state) to (expanded endpoints, failures), re-run
//! wholesale on every reconciliation; the only side effect is rewriting the
//! AddressesValid condition in status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::crd::{
    Condition, ConditionStatus, EndpointSubset, Protocol, VirtualMachineEndpoints,
    VirtualMachineEndpointsStatus, CONDITION_ADDRESSES_VALID,
};
use crate::vm::VmLookup;
use crate::Error;

/// One concrete (address, port) pair produced by subset expansion.
///
/// This is the unit a data-plane synchronizer would program; the resolver
/// itself only computes and validates it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// Validated endpoint IP
    pub ip: String,
    /// VM hosting the endpoint
    pub node_name: String,
    /// Port number
    pub port: i32,
    /// IP protocol of the port
    pub protocol: Protocol,
    /// Declared port name, if any
    pub port_name: Option<String>,
}

/// Category of an address validation failure.
///
/// These are the machine-readable reasons surfaced through the
/// AddressesValid condition; they are data, never reconcile errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// No VirtualMachine with the claimed nodeName exists
    VmNotFound,
    /// The VM exists but has not reported any IP to default to
    VmIpUnavailable,
    /// The claimed IP is not among the IPs the VM reports
    IpNotOwnedByVm,
}

impl FailureReason {
    /// Wire form of the reason, as recorded in the condition
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VmNotFound => "VMNotFound",
            Self::VmIpUnavailable => "VMIPUnavailable",
            Self::IpNotOwnedByVm => "IPNotOwnedByVM",
        }
    }
}

/// A single address that failed validation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressFailure {
    /// nodeName of the failing address
    pub node_name: String,
    /// Explicit IP claim of the failing address, if it made one
    pub ip: Option<String>,
    /// Failure category
    pub reason: FailureReason,
}

impl AddressFailure {
    /// Human-readable description used as the condition message
    pub fn message(&self) -> String {
        match (self.reason, &self.ip) {
            (FailureReason::VmNotFound, _) => {
                format!("virtual machine {:?} not found", self.node_name)
            }
            (FailureReason::VmIpUnavailable, _) => {
                format!("virtual machine {:?} has not reported an IP", self.node_name)
            }
            (FailureReason::IpNotOwnedByVm, Some(ip)) => {
                format!(
                    "ip {:?} is not reported by virtual machine {:?}",
                    ip, self.node_name
                )
            }
            // IpNotOwnedByVm implies an explicit claim; keep a sane fallback.
            (FailureReason::IpNotOwnedByVm, None) => {
                format!("ip not reported by virtual machine {:?}", self.node_name)
            }
        }
    }
}

/// Outcome of resolving a full subsets spec against VM state
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    /// Expanded endpoints in subset, then address, then port order
    pub endpoints: Vec<ResolvedEndpoint>,
    /// Every address that failed validation, in encounter order
    pub failures: Vec<AddressFailure>,
}

impl Resolution {
    /// Whether every address across every subset validated successfully
    pub fn addresses_valid(&self) -> bool {
        self.failures.is_empty()
    }

    /// Build the AddressesValid condition for this resolution.
    ///
    /// On failure the reason and message describe the first failing address.
    /// The transition time is carried over from `prior` when the boolean
    /// value has not changed.
    pub fn condition(&self, prior: Option<&Condition>) -> Condition {
        let next = match self.failures.first() {
            None => Condition::new(
                CONDITION_ADDRESSES_VALID,
                ConditionStatus::True,
                "Validated",
                "",
            ),
            Some(first) => Condition::new(
                CONDITION_ADDRESSES_VALID,
                ConditionStatus::False,
                first.reason.as_str(),
                first.message(),
            ),
        };
        next.preserving_transition_from(prior)
    }
}

/// Resolve endpoint subsets against authoritative VM state.
///
/// Pure with respect to the cluster: reads VM state through `vms`, mutates
/// nothing. The expansion order is deterministic — subsets in spec order,
/// addresses in subset order, ports in subset order — so unchanged input
/// yields byte-identical output and downstream consumers see no churn.
///
/// Validation failures are recorded in the result; only transient lookup
/// failures return an error, and those mean nothing can be concluded about
/// the addresses involved.
pub async fn resolve_subsets(
    namespace: &str,
    subsets: &[EndpointSubset],
    vms: &dyn VmLookup,
) -> Result<Resolution, Error> {
    let mut resolution = Resolution::default();

    for subset in subsets {
        // Validate addresses first; only valid ones participate in the
        // Cartesian expansion with this subset's ports.
        let mut valid = Vec::with_capacity(subset.addresses.len());

        for address in &subset.addresses {
            let vm = match vms.by_name(namespace, &address.node_name).await? {
                Some(vm) => vm,
                None => {
                    resolution.failures.push(AddressFailure {
                        node_name: address.node_name.clone(),
                        ip: address.ip.clone(),
                        reason: FailureReason::VmNotFound,
                    });
                    continue;
                }
            };

            match &address.ip {
                // No claim: default to the VM's reported primary IP.
                None => match vm.effective_ip() {
                    Some(ip) => valid.push((ip.to_string(), address.node_name.clone())),
                    None => resolution.failures.push(AddressFailure {
                        node_name: address.node_name.clone(),
                        ip: None,
                        reason: FailureReason::VmIpUnavailable,
                    }),
                },
                // Explicit claim: accepted only if the VM reports that IP.
                Some(ip) if vm.owns_ip(ip) => {
                    valid.push((ip.clone(), address.node_name.clone()));
                }
                Some(ip) => resolution.failures.push(AddressFailure {
                    node_name: address.node_name.clone(),
                    ip: Some(ip.clone()),
                    reason: FailureReason::IpNotOwnedByVm,
                }),
            }
        }

        for (ip, node_name) in &valid {
            for port in &subset.ports {
                resolution.endpoints.push(ResolvedEndpoint {
                    ip: ip.clone(),
                    node_name: node_name.clone(),
                    port: port.port,
                    protocol: port.protocol,
                    port_name: port.name.clone(),
                });
            }
        }
    }

    Ok(resolution)
}

/// Trait abstracting status writes for VirtualMachineEndpoints
///
/// This trait allows mocking the status writer in tests while using the
/// real Kubernetes client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EndpointsStatusWriter: Send + Sync {
    /// Patch the status subresource of a VirtualMachineEndpoints
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &VirtualMachineEndpointsStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes-backed status writer
pub struct EndpointsStatusWriterImpl {
    client: Client,
}

impl EndpointsStatusWriterImpl {
    /// Create a writer over the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EndpointsStatusWriter for EndpointsStatusWriterImpl {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &VirtualMachineEndpointsStatus,
    ) -> Result<(), Error> {
        let api: Api<VirtualMachineEndpoints> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply(crate::FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;
        Ok(())
    }
}

/// Shared context for the resolution controller
pub struct Context {
    /// Authoritative VM state lookup
    pub vms: Arc<dyn VmLookup>,
    /// Status writes
    pub status: Arc<dyn EndpointsStatusWriter>,
    /// Periodic revalidation interval; VM IPs can change without any event
    /// on the endpoints resource itself
    pub resync: Duration,
}

impl Context {
    /// Create a production context over the given client
    pub fn new(client: Client, resync: Duration) -> Self {
        Self {
            vms: Arc::new(crate::vm::KubeVmLookup::new(client.clone())),
            status: Arc::new(EndpointsStatusWriterImpl::new(client)),
            resync,
        }
    }

    /// Create a context with explicit collaborators (primarily for testing)
    pub fn with_collaborators(
        vms: Arc<dyn VmLookup>,
        status: Arc<dyn EndpointsStatusWriter>,
        resync: Duration,
    ) -> Self {
        Self { vms, status, resync }
    }
}

/// Reconcile a VirtualMachineEndpoints resource
///
/// Recomputes the full expansion and validation from scratch and rewrites
/// the AddressesValid condition. Transient VM lookup failures abort before
/// any status write, so the prior condition stands until a retry can reach
/// a verdict.
#[instrument(skip(endpoints, ctx), fields(endpoints = %endpoints.name_any()))]
pub async fn reconcile(
    endpoints: Arc<VirtualMachineEndpoints>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let namespace = endpoints.namespace().unwrap_or_else(|| "default".to_string());
    let name = endpoints.name_any();

    let resolution = resolve_subsets(&namespace, &endpoints.spec.subsets, ctx.vms.as_ref()).await?;

    if resolution.addresses_valid() {
        debug!(count = resolution.endpoints.len(), "all endpoint addresses valid");
    } else {
        let first = &resolution.failures[0];
        warn!(
            node_name = %first.node_name,
            reason = first.reason.as_str(),
            failures = resolution.failures.len(),
            "endpoint address validation failed"
        );
    }

    let prior_status = endpoints.status.clone().unwrap_or_default();
    let condition = resolution.condition(prior_status.addresses_valid());
    let status = prior_status.clone().condition(condition);

    // An unchanged status is not rewritten; periodic resyncs would
    // otherwise generate a steady stream of no-op patches.
    if status != prior_status {
        ctx.status.patch_status(&namespace, &name, &status).await?;
    }

    Ok(Action::requeue(ctx.resync))
}

/// Error policy for the resolution controller
///
/// Reached only for infrastructure failures (VM lookup, status write); a
/// validation failure is a normal outcome recorded in status, never an
/// error. Requeue with a short delay.
pub fn error_policy(
    endpoints: Arc<VirtualMachineEndpoints>,
    err: &Error,
    _ctx: Arc<Context>,
) -> Action {
    error!(
        endpoints = %endpoints.name_any(),
        error = %err,
        "endpoint resolution failed"
    );
    Action::requeue(Duration::from_secs(5))
}
