//! Custom Resource Definitions for the virt-controller
//!
//! This module contains the VirtualMachine CRD and the well-known label and
//! annotation keys the controller stamps onto the objects it creates.

mod types;
mod vm;

pub use types::{
    Cpu, DomainSpec, EmptyDiskSource, PersistentVolumeClaimSource, RegistryDiskSource,
    ResourceQuantity, ResourceRequirements, Volume, VolumeSource,
};
pub use vm::{VirtualMachine, VirtualMachineSpec};

/// Label identifying the component that owns a pod
pub const APP_LABEL: &str = "kubevirt.io";

/// Label carrying the name of the VM a launcher pod runs
pub const DOMAIN_LABEL: &str = "kubevirt.io/domain";

/// Annotation recording the UID of the VM a pod was created for
pub const CREATED_BY_ANNOTATION: &str = "kubevirt.io/created-by";

/// Annotation recording the controller that owns a pod
pub const OWNED_BY_ANNOTATION: &str = "kubevirt.io/owned-by";

/// Node label marking a node as able to run launcher pods
pub const NODE_SCHEDULABLE_LABEL: &str = "kubevirt.io/schedulable";
