//! VirtualMachine Custom Resource Definition
//!
//! A VirtualMachine describes one guest: its hardware, placement, and disks.
//! The controller renders a launcher pod for each VirtualMachine that runs the
//! hypervisor process on a schedulable node.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Affinity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{DomainSpec, Volume};

/// Specification for a VirtualMachine
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kubevirt.io",
    version = "v1alpha1",
    kind = "VirtualMachine",
    plural = "virtualmachines",
    shortname = "vm",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    /// Guest hardware
    #[serde(default)]
    pub domain: DomainSpec,

    /// Node labels the launcher pod must be scheduled onto
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Scheduling affinity, passed to the launcher pod unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Guest hostname; defaults to the VM name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// DNS subdomain of the guest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,

    /// Disks in attachment order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

impl VirtualMachineSpec {
    /// Returns true if the VM declares its own affinity rules
    pub fn has_affinity(&self) -> bool {
        self.affinity.is_some()
    }
}
