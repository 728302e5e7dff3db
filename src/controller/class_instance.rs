//! VirtualMachineClassInstance pinning controller
//!
//! This module implements the reconciliation logic that pins a VM's class:
//! on the first reconciliation of a VM referencing a VirtualMachineClass,
//! the class's spec and status are deep-copied into a VM-owned
//! VirtualMachineClassInstance. The instance is never touched again, so the
//! VM's effective configuration is fixed at first use and immune to later
//! edits of the shared class. Deletion is left to owner-reference garbage
//! collection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Patch, PatchParams, PostParams};
use kube::core::ObjectMeta;
use kube::runtime::controller::Action;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::crd::{
    VirtualMachine, VirtualMachineClass, VirtualMachineClassInstance,
    VirtualMachineClassInstanceSpec, VirtualMachineClassStatus,
};
use crate::error;
use crate::Error;

/// Trait abstracting VirtualMachineClass reads
///
/// This trait allows mocking the class store in tests while using the real
/// Kubernetes client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClassStore: Send + Sync {
    /// Get a class by name, or None if it does not exist
    async fn get_class(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VirtualMachineClass>, Error>;
}

/// Trait abstracting VirtualMachineClassInstance reads and creation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Get an instance by name, or None if it does not exist
    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VirtualMachineClassInstance>, Error>;

    /// Create an instance.
    ///
    /// Fails with a 409 AlreadyExists kube error if a concurrent
    /// reconciliation won the creation race; callers treat that as success.
    async fn create_instance(
        &self,
        namespace: &str,
        instance: &VirtualMachineClassInstance,
    ) -> Result<(), Error>;

    /// Patch the status subresource of an existing instance.
    ///
    /// Create drops status, so pinning always needs this as a second write;
    /// it is also the repair path when that second write was lost.
    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: &VirtualMachineClassStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes-backed class store
pub struct ClassStoreImpl {
    client: Client,
}

impl ClassStoreImpl {
    /// Create a store over the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClassStore for ClassStoreImpl {
    async fn get_class(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VirtualMachineClass>, Error> {
        let api: Api<VirtualMachineClass> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(class) => Ok(Some(class)),
            Err(e) if error::is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Real Kubernetes-backed instance store
pub struct InstanceStoreImpl {
    client: Client,
}

impl InstanceStoreImpl {
    /// Create a store over the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<VirtualMachineClassInstance> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl InstanceStore for InstanceStoreImpl {
    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VirtualMachineClassInstance>, Error> {
        match self.api(namespace).get(name).await {
            Ok(instance) => Ok(Some(instance)),
            Err(e) if error::is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_instance(
        &self,
        namespace: &str,
        instance: &VirtualMachineClassInstance,
    ) -> Result<(), Error> {
        let created = self
            .api(namespace)
            .create(&PostParams::default(), instance)
            .await?;

        // Status is a subresource and is dropped on create; copy the pinned
        // class status over in a follow-up patch.
        if let Some(status) = &instance.status {
            self.update_status(namespace, &created.name_any(), status)
                .await?;
        }

        Ok(())
    }

    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: &VirtualMachineClassStatus,
    ) -> Result<(), Error> {
        let status_patch = serde_json::json!({ "status": status });
        self.api(namespace)
            .patch_status(
                name,
                &PatchParams::apply(crate::FIELD_MANAGER),
                &Patch::Merge(&status_patch),
            )
            .await?;
        Ok(())
    }
}

/// Shared context for the pinning controller
pub struct Context {
    /// Class reads
    pub classes: Arc<dyn ClassStore>,
    /// Instance reads and creation
    pub instances: Arc<dyn InstanceStore>,
}

impl Context {
    /// Create a production context over the given client
    pub fn new(client: Client) -> Self {
        Self {
            classes: Arc::new(ClassStoreImpl::new(client.clone())),
            instances: Arc::new(InstanceStoreImpl::new(client)),
        }
    }

    /// Create a context with explicit collaborators (primarily for testing)
    pub fn with_stores(classes: Arc<dyn ClassStore>, instances: Arc<dyn InstanceStore>) -> Self {
        Self { classes, instances }
    }
}

/// Name of the class instance pinned for a VM
///
/// Derived from the owning VM so the (namespace, name) identity is stable
/// across reconciliations and unique per VM.
pub fn instance_name(vm_name: &str) -> String {
    format!("{vm_name}-class")
}

/// Build the instance to pin for a VM from the class as currently observed
fn build_instance(
    vm: &VirtualMachine,
    name: &str,
    class: &VirtualMachineClass,
) -> VirtualMachineClassInstance {
    VirtualMachineClassInstance {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: vm.namespace(),
            owner_references: Some(vec![owner_reference(vm)]),
            ..Default::default()
        },
        spec: VirtualMachineClassInstanceSpec::from(class.spec.clone()),
        status: class.status.clone(),
    }
}

/// Controller owner reference pointing at the VM, so deleting the VM
/// cascade-deletes its pinned instance
fn owner_reference(vm: &VirtualMachine) -> OwnerReference {
    OwnerReference {
        api_version: VirtualMachine::api_version(&()).into_owned(),
        kind: VirtualMachine::kind(&()).into_owned(),
        name: vm.name_any(),
        uid: vm.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Reconcile a VirtualMachine's pinned class instance
///
/// Pinning is one-shot: if the instance already exists, the reconciliation
/// is a no-op regardless of how the source class has drifted since. If it
/// does not, the referenced class is snapshotted and created under the VM's
/// ownership.
///
/// # Returns
///
/// Returns an `Action` indicating when to requeue, or an error if the class
/// is missing or the API failed; both are retried by the error policy.
#[instrument(skip(vm, ctx), fields(vm = %vm.name_any()))]
pub async fn reconcile(vm: Arc<VirtualMachine>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = vm.namespace().unwrap_or_else(|| "default".to_string());

    let Some(class_name) = vm.spec.class_name.clone() else {
        debug!("vm references no class, nothing to pin");
        return Ok(Action::await_change());
    };

    let name = instance_name(&vm.name_any());

    // One-shot guard: an existing instance is the VM's fixed configuration.
    if let Some(existing) = ctx.instances.get_instance(&namespace, &name).await? {
        if existing.status.is_none() {
            // A failure between create and the status patch leaves a
            // spec-only snapshot; finish it before going quiet.
            let class = ctx
                .classes
                .get_class(&namespace, &class_name)
                .await?
                .ok_or_else(|| Error::ClassNotFound(class_name.clone()))?;
            if let Some(status) = &class.status {
                ctx.instances.update_status(&namespace, &name, status).await?;
                info!(instance = %name, "completed partially pinned instance status");
            }
        } else {
            debug!(instance = %name, "class already pinned");
        }
        return Ok(Action::await_change());
    }

    let class = ctx
        .classes
        .get_class(&namespace, &class_name)
        .await?
        .ok_or_else(|| Error::ClassNotFound(class_name.clone()))?;

    let instance = build_instance(&vm, &name, &class);
    match ctx.instances.create_instance(&namespace, &instance).await {
        Ok(()) => {
            info!(class = %class_name, instance = %name, "pinned class for vm");
        }
        Err(Error::Kube(e)) if error::is_already_exists(&e) => {
            // Lost the creation race to a concurrent reconciliation; the
            // winner's snapshot is just as valid as ours would have been.
            // Re-fetch to confirm it landed.
            let winner = ctx.instances.get_instance(&namespace, &name).await?;
            debug!(instance = %name, present = winner.is_some(), "instance created concurrently");
        }
        Err(e) => return Err(e),
    }

    Ok(Action::await_change())
}

/// Error policy for the pinning controller
///
/// Every error here is retryable: a missing class may be created later, and
/// API failures are transient. Requeue with a short delay.
pub fn error_policy(vm: Arc<VirtualMachine>, err: &Error, _ctx: Arc<Context>) -> Action {
    match err {
        Error::ClassNotFound(class) => {
            warn!(vm = %vm.name_any(), class = %class, "referenced class not found, will retry");
        }
        // Optimistic-concurrency collisions resolve themselves on retry and
        // are not worth an error-level log.
        Error::Kube(e) if error::is_conflict(e) => {
            debug!(vm = %vm.name_any(), "write conflicted with a concurrent writer, will retry");
        }
        _ => {
            error!(vm = %vm.name_any(), error = %err, "pin reconciliation failed");
        }
    }
    Action::requeue(Duration::from_secs(5))
}
