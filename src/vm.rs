//! VM state lookup adapter
//!
//! Both reconcilers depend on the authoritative VM state published by the VM
//! lifecycle controller: which VMs exist and which IPs they report. This
//! module abstracts that lookup behind a trait so controllers can be tested
//! against canned VM state, with a kube-backed implementation for production.

use async_trait::async_trait;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::crd::VirtualMachine;
use crate::error;
use crate::Error;

/// Live network identity of a VM, as reported by the lifecycle controller
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VmRecord {
    /// Name of the VirtualMachine resource
    pub name: String,

    /// Primary IP, if the VM has reported one
    pub primary_ip: Option<String>,

    /// Every IP the VM currently reports, primary included
    pub ips: Vec<String>,

    /// BIOS UUID; matches the guest node's provider ID
    pub bios_uuid: Option<String>,
}

impl VmRecord {
    /// Build a record from a VirtualMachine resource
    pub fn from_vm(vm: &VirtualMachine) -> Self {
        let status = vm.status.clone().unwrap_or_default();
        Self {
            name: vm.name_any(),
            primary_ip: status.vm_ip,
            ips: status.ips,
            bios_uuid: status.bios_uuid,
        }
    }

    /// The IP used when an endpoint address omits one.
    ///
    /// Deterministic rule for multi-IP VMs: the reported primary IP wins;
    /// without one, the first reported IP is used.
    pub fn effective_ip(&self) -> Option<&str> {
        self.primary_ip
            .as_deref()
            .or_else(|| self.ips.first().map(String::as_str))
    }

    /// Whether the VM currently reports the given IP
    pub fn owns_ip(&self, ip: &str) -> bool {
        self.primary_ip.as_deref() == Some(ip) || self.ips.iter().any(|i| i == ip)
    }
}

/// Trait abstracting VM state lookup for the controllers
///
/// `Ok(None)` means the VM definitively does not exist — a validation
/// outcome. `Err` means the lookup itself failed and nothing can be
/// concluded about the VM; callers must retry rather than treat it as
/// absence.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VmLookup: Send + Sync {
    /// Look up a VM by resource name within a namespace
    async fn by_name(&self, namespace: &str, name: &str) -> Result<Option<VmRecord>, Error>;

    /// Look up a VM by BIOS UUID within a namespace.
    ///
    /// Used to map a guest node's provider ID back to its VirtualMachine.
    async fn by_bios_uuid(&self, namespace: &str, uuid: &str) -> Result<Option<VmRecord>, Error>;
}

/// Kube-backed VM lookup
pub struct KubeVmLookup {
    client: Client,
}

impl KubeVmLookup {
    /// Create a lookup over the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<VirtualMachine> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl VmLookup for KubeVmLookup {
    async fn by_name(&self, namespace: &str, name: &str) -> Result<Option<VmRecord>, Error> {
        match self.api(namespace).get(name).await {
            Ok(vm) => Ok(Some(VmRecord::from_vm(&vm))),
            Err(e) if error::is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn by_bios_uuid(&self, namespace: &str, uuid: &str) -> Result<Option<VmRecord>, Error> {
        // BIOS UUID is not a label, so the API server cannot filter for us.
        let vms = self
            .api(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::vm_lookup(format!("listing virtualmachines: {e}")))?;

        Ok(vms
            .items
            .iter()
            .find(|vm| bios_uuid_matches(vm, uuid))
            .map(VmRecord::from_vm))
    }
}

/// Whether a VM's reported BIOS UUID matches the given one.
///
/// Provider IDs surface the UUID in varying case depending on the
/// hypervisor tooling, so the comparison ignores case.
fn bios_uuid_matches(vm: &VirtualMachine, uuid: &str) -> bool {
    vm.status
        .as_ref()
        .and_then(|s| s.bios_uuid.as_deref())
        .is_some_and(|u| u.eq_ignore_ascii_case(uuid))
}
