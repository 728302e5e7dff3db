//! Controller implementations for the VM operator CRDs
//!
//! This module contains the reconciliation logic for the custom resources.
//! Controllers follow the Kubernetes controller pattern with observe-diff-act
//! loops; each one keeps its collaborators behind traits so the loops can be
//! exercised without a cluster.

pub mod class_instance;
pub mod endpoints;
