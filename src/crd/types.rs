//! Supporting types for the VirtualMachine CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Domain (guest hardware) specification
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    /// CPU topology
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Cpu>,

    /// Resource requests and limits for the guest
    #[serde(default)]
    pub resources: ResourceRequirements,
}

impl DomainSpec {
    /// Number of virtual CPU cores, zero when no topology is set
    pub fn cores(&self) -> u32 {
        self.cpu.as_ref().map(|cpu| cpu.cores).unwrap_or_default()
    }
}

/// CPU topology
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Cpu {
    /// Number of cores presented to the guest
    #[serde(default)]
    pub cores: u32,
}

/// Resource requirements for the guest
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResourceRequirements {
    /// Minimum resources the guest needs to be scheduled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceQuantity>,

    /// Maximum resources the guest may consume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceQuantity>,
}

impl ResourceRequirements {
    /// Memory the guest can address: the request, or the limit when no request is set
    pub fn guest_memory(&self) -> Option<&str> {
        self.requests
            .as_ref()
            .and_then(|r| r.memory.as_deref())
            .or_else(|| self.limits.as_ref().and_then(|l| l.memory.as_deref()))
    }
}

/// CPU and memory quantities
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceQuantity {
    /// CPU quantity (e.g. "500m", "2")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory quantity (e.g. "1G", "512Mi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// A named disk source attached to the VM
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Volume {
    /// Volume name, unique within the VM
    pub name: String,

    /// Where the disk comes from
    #[serde(flatten)]
    pub source: VolumeSource,
}

impl Volume {
    /// Create a volume backed by a PersistentVolumeClaim
    pub fn pvc(name: impl Into<String>, claim_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::PersistentVolumeClaim(PersistentVolumeClaimSource {
                claim_name: claim_name.into(),
                read_only: None,
            }),
        }
    }

    /// Create a volume backed by a registry disk image
    pub fn registry_disk(
        name: impl Into<String>,
        image: impl Into<String>,
        image_pull_secret: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::RegistryDisk(RegistryDiskSource {
                image: image.into(),
                image_pull_secret,
            }),
        }
    }

    /// Create a scratch disk of the given capacity
    pub fn empty_disk(name: impl Into<String>, capacity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::EmptyDisk(EmptyDiskSource {
                capacity: capacity.into(),
            }),
        }
    }
}

/// Volume source variants
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSource {
    /// Disk stored on a PersistentVolumeClaim in the VM namespace
    PersistentVolumeClaim(PersistentVolumeClaimSource),
    /// Disk image pulled from a container registry
    RegistryDisk(RegistryDiskSource),
    /// Ephemeral scratch disk that lives as long as the launcher pod
    EmptyDisk(EmptyDiskSource),
}

impl VolumeSource {
    /// Pull secret this source needs, if any
    pub fn image_pull_secret(&self) -> Option<&str> {
        match self {
            Self::RegistryDisk(disk) => disk.image_pull_secret.as_deref(),
            Self::PersistentVolumeClaim(_) | Self::EmptyDisk(_) => None,
        }
    }
}

/// PersistentVolumeClaim reference
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSource {
    /// Name of the claim
    #[serde(default)]
    pub claim_name: String,

    /// Mount the claim read-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

/// Registry disk image reference
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDiskSource {
    /// Container image holding the disk
    #[serde(default)]
    pub image: String,

    /// Secret used to pull the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<String>,
}

/// Scratch disk
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct EmptyDiskSource {
    /// Disk size (e.g. "2Gi")
    #[serde(default)]
    pub capacity: String,
}
