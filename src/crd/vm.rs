//! VirtualMachine Custom Resource Definition
//!
//! This is the slice of the VirtualMachine API this operator consumes. The
//! broader VM lifecycle controller owns the resource and reports the live
//! network identity (IPs, BIOS UUID) that endpoint validation checks against.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a VirtualMachine
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "vmoperator.dev",
    version = "v1alpha1",
    kind = "VirtualMachine",
    plural = "virtualmachines",
    shortname = "vm",
    status = "VirtualMachineStatus",
    namespaced,
    printcolumn = r#"{"name":"Class","type":"string","jsonPath":".spec.className"}"#,
    printcolumn = r#"{"name":"IP","type":"string","jsonPath":".status.vmIp"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    /// Name of the VirtualMachineClass this VM is sized from.
    ///
    /// On first reconciliation the class is pinned into a per-VM
    /// VirtualMachineClassInstance; later edits of the class do not reach
    /// this VM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    /// Name of the machine image the VM boots from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
}

/// Observed state of a VirtualMachine, reported by the VM lifecycle controller
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineStatus {
    /// Primary IP of the VM, if it has reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_ip: Option<String>,

    /// Every IP the VM currently reports, primary included
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<String>,

    /// BIOS UUID of the VM; matches the node's provider ID on the guest side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bios_uuid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: The lifecycle controller reports VM state in camelCase JSON
    ///
    /// Endpoint validation reads vmIp/ips/biosUuid exactly as the lifecycle
    /// controller writes them; a field-name drift here would silently break
    /// address ownership checks.
    #[test]
    fn story_status_uses_wire_field_names() {
        let json = r#"{"vmIp":"10.0.0.5","ips":["10.0.0.5","10.0.0.6"],"biosUuid":"4203ec"}"#;
        let status: VirtualMachineStatus = serde_json::from_str(json).unwrap();

        assert_eq!(status.vm_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(status.ips.len(), 2);
        assert_eq!(status.bios_uuid.as_deref(), Some("4203ec"));
    }

    /// Story: A freshly created VM has reported nothing yet
    #[test]
    fn story_empty_status_deserializes() {
        let status: VirtualMachineStatus = serde_json::from_str("{}").unwrap();
        assert!(status.vm_ip.is_none());
        assert!(status.ips.is_empty());
    }
}
