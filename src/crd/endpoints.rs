//! VirtualMachineEndpoints Custom Resource Definition
//!
//! A VirtualMachineEndpoints resource declares the network endpoints backing
//! a VM-exposed service as subsets of addresses and ports. Each subset
//! expands to the Cartesian product of its addresses and ports. The resolver
//! validates every address against the named VM and reports the verdict
//! through the AddressesValid condition.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Condition type set on a VirtualMachineEndpoints resource.
///
/// True only when every address in every subset has been validated as
/// belonging to the VirtualMachine named by its `nodeName`.
pub const CONDITION_ADDRESSES_VALID: &str = "AddressesValid";

/// IP protocol for an endpoint port
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// Transmission Control Protocol
    #[default]
    Tcp,
    /// User Datagram Protocol
    Udp,
    /// Stream Control Transmission Protocol
    Sctp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
            Self::Sctp => write!(f, "SCTP"),
        }
    }
}

/// A single endpoint IP address claim
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointAddress {
    /// IP of this endpoint.
    ///
    /// When omitted, the primary IP reported by the VirtualMachine named by
    /// `nodeName` is used. When set, it is accepted only if the VM actually
    /// reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Name of the VirtualMachine resource hosting this endpoint
    pub node_name: String,
}

/// A single endpoint port
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPort {
    /// Name of this port; optional if only one port is defined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Port number
    pub port: i32,

    /// IP protocol for this port
    #[serde(default)]
    pub protocol: Protocol,

    /// Application protocol for this port (e.g., an IANA service name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_protocol: Option<String>,
}

/// A group of addresses with a common set of ports.
///
/// The expanded set of endpoints is the Cartesian product of addresses and
/// ports.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSubset {
    /// Addresses in this subset, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<EndpointAddress>,

    /// Ports in this subset, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<EndpointPort>,
}

/// Specification for a VirtualMachineEndpoints resource
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "vmoperator.dev",
    version = "v1alpha1",
    kind = "VirtualMachineEndpoints",
    plural = "virtualmachineendpoints",
    shortname = "vmendpoints",
    status = "VirtualMachineEndpointsStatus",
    namespaced,
    printcolumn = r#"{"name":"Valid","type":"string","jsonPath":".status.conditions[?(@.type=='AddressesValid')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineEndpointsSpec {
    /// Union of all subsets backing the service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsets: Vec<EndpointSubset>,
}

/// Observed state of a VirtualMachineEndpoints resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineEndpointsStatus {
    /// Latest observations of the resource's state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl VirtualMachineEndpointsStatus {
    /// Add a condition, replacing any existing condition of the same type,
    /// and return self for chaining
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }

    /// The AddressesValid condition, if one has been recorded
    pub fn addresses_valid(&self) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.type_ == CONDITION_ADDRESSES_VALID)
    }
}
