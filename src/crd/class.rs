//! VirtualMachineClass and VirtualMachineClassInstance CRDs
//!
//! A VirtualMachineClass is a shared, mutable sizing template referenced by
//! many VMs. A VirtualMachineClassInstance is a per-VM deep copy of a class's
//! spec and status, taken at first reference, so that VMs are not affected by
//! later changes to the class.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Virtual hardware sizing for a class
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineClassHardware {
    /// Number of virtual CPUs
    pub cpus: i64,

    /// Memory size as a Kubernetes quantity string (e.g., "4Gi")
    pub memory: String,
}

/// Resource requests and limits applied to VMs of a class
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineResourceSpec {
    /// CPU reservation as a quantity string (e.g., "1000m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory reservation as a quantity string (e.g., "2Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Resource policies for a class
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineClassPolicies {
    /// Guaranteed resource floor for VMs of this class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<VirtualMachineResourceSpec>,

    /// Resource ceiling for VMs of this class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<VirtualMachineResourceSpec>,
}

/// Specification for a VirtualMachineClass
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "vmoperator.dev",
    version = "v1alpha1",
    kind = "VirtualMachineClass",
    plural = "virtualmachineclasses",
    shortname = "vmclass",
    status = "VirtualMachineClassStatus",
    namespaced,
    printcolumn = r#"{"name":"CPUs","type":"integer","jsonPath":".spec.hardware.cpus"}"#,
    printcolumn = r#"{"name":"Memory","type":"string","jsonPath":".spec.hardware.memory"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineClassSpec {
    /// Virtual hardware sizing
    pub hardware: VirtualMachineClassHardware,

    /// Resource policies (requests/limits)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies: Option<VirtualMachineClassPolicies>,

    /// Human-readable description of the class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Status for a VirtualMachineClass
///
/// Also the status of a pinned VirtualMachineClassInstance, which snapshots
/// it verbatim at pin time.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineClassStatus {
    /// Conditions representing the class state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Specification for a VirtualMachineClassInstance
///
/// Mirrors VirtualMachineClassSpec field-for-field; the flatten keeps the
/// serialized shape identical to the class it was copied from.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "vmoperator.dev",
    version = "v1alpha1",
    kind = "VirtualMachineClassInstance",
    plural = "virtualmachineclassinstances",
    shortname = "vmclassinstance",
    status = "VirtualMachineClassStatus",
    namespaced,
    printcolumn = r#"{"name":"CPUs","type":"integer","jsonPath":".spec.hardware.cpus"}"#,
    printcolumn = r#"{"name":"Memory","type":"string","jsonPath":".spec.hardware.memory"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct VirtualMachineClassInstanceSpec {
    /// The class spec as it was at pin time
    #[serde(flatten)]
    pub class: VirtualMachineClassSpec,
}

impl From<VirtualMachineClassSpec> for VirtualMachineClassInstanceSpec {
    fn from(class: VirtualMachineClassSpec) -> Self {
        Self { class }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_class_spec() -> VirtualMachineClassSpec {
        VirtualMachineClassSpec {
            hardware: VirtualMachineClassHardware {
                cpus: 4,
                memory: "8Gi".to_string(),
            },
            policies: Some(VirtualMachineClassPolicies {
                requests: Some(VirtualMachineResourceSpec {
                    cpu: Some("2000m".to_string()),
                    memory: Some("4Gi".to_string()),
                }),
                limits: None,
            }),
            description: Some("general purpose".to_string()),
        }
    }

    /// Story: A pinned instance serializes exactly like its source class
    ///
    /// The instance spec is a field-for-field mirror of the class spec, so
    /// tooling that reads either sees the same shape. The flatten must not
    /// introduce a wrapper key.
    #[test]
    fn story_instance_spec_mirrors_class_spec_on_the_wire() {
        let class = sample_class_spec();
        let instance = VirtualMachineClassInstanceSpec::from(class.clone());

        let class_json = serde_json::to_value(&class).unwrap();
        let instance_json = serde_json::to_value(&instance).unwrap();
        assert_eq!(class_json, instance_json);
    }

    /// Story: Platform operators define classes in YAML manifests
    #[test]
    fn story_yaml_manifest_defines_class() {
        let yaml = r#"
hardware:
  cpus: 2
  memory: "4Gi"
policies:
  requests:
    cpu: "1000m"
description: small burstable class
"#;
        let spec: VirtualMachineClassSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.hardware.cpus, 2);
        assert_eq!(spec.hardware.memory, "4Gi");
        assert_eq!(
            spec.policies
                .unwrap()
                .requests
                .unwrap()
                .cpu
                .as_deref(),
            Some("1000m")
        );
    }

    /// Story: The snapshot is an independent copy, not a live reference
    ///
    /// Mutating the original spec after conversion must not be observable
    /// through the instance.
    #[test]
    fn story_instance_spec_is_a_deep_copy() {
        let mut class = sample_class_spec();
        let instance = VirtualMachineClassInstanceSpec::from(class.clone());

        class.hardware.cpus = 64;
        class.description = None;

        assert_eq!(instance.class.hardware.cpus, 4);
        assert_eq!(instance.class.description.as_deref(), Some("general purpose"));
    }
}
