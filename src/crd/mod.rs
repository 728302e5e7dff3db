//! Custom Resource Definitions for the VM operator
//!
//! This module contains all CRD definitions the operator serves and watches:
//! the VirtualMachine surface the operator consumes, the shared
//! VirtualMachineClass template with its per-VM pinned instance, and the
//! VirtualMachineEndpoints resource whose subsets the resolver expands.

mod class;
mod endpoints;
mod types;
mod vm;

pub use class::{
    VirtualMachineClass, VirtualMachineClassHardware, VirtualMachineClassInstance,
    VirtualMachineClassInstanceSpec, VirtualMachineClassPolicies, VirtualMachineClassSpec,
    VirtualMachineClassStatus, VirtualMachineResourceSpec,
};
pub use endpoints::{
    EndpointAddress, EndpointPort, EndpointSubset, Protocol, VirtualMachineEndpoints,
    VirtualMachineEndpointsSpec, VirtualMachineEndpointsStatus, CONDITION_ADDRESSES_VALID,
};
pub use types::{Condition, ConditionStatus};
pub use vm::{VirtualMachine, VirtualMachineSpec, VirtualMachineStatus};
