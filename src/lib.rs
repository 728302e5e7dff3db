//! VM Operator - Kubernetes operator for virtual machine class pinning and
//! endpoint resolution
//!
//! The operator runs two reconciliation loops:
//! - The class instance pinner snapshots a VirtualMachineClass into an
//!   immutable per-VM VirtualMachineClassInstance the moment a VM references
//!   the class, insulating running VMs from later class edits.
//! - The endpoint resolver expands declarative VirtualMachineEndpoints
//!   subsets into concrete (address, port) pairs, validating every address
//!   against authoritative VM state and recording the verdict in status.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (VirtualMachine, VirtualMachineClass, etc.)
//! - [`controller`] - Kubernetes controller reconciliation logic
//! - [`vm`] - Authoritative VM state lookup
//! - [`retry`] - Retry with exponential backoff for startup operations
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod controller;
pub mod crd;
pub mod error;
pub mod retry;
pub mod vm;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager name used for all server-side apply and status patches
pub const FIELD_MANAGER: &str = "vm-operator";

/// Default revalidation interval for endpoint resolution, in seconds
///
/// VM IPs can change with no event on the endpoints resource itself, so
/// the resolver re-runs validation on a timer rather than only on edits.
pub const DEFAULT_RESYNC_SECS: u64 = 60;
