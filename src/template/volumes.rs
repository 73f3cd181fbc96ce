//! Launcher pod volumes, mounts, and image pull secrets
//!
//! VM volumes are translated one-to-one, in declaration order, into pod
//! volumes. Two infrastructure volumes follow them on every pod: the node's
//! shared state directory and a scratch directory for libvirt runtime state.
//! Registry disks additionally get a sidecar container that copies the disk
//! image out of its container image into a volume shared with the launcher.

use std::collections::HashSet;

use crate::crd::{self, RegistryDiskSource, VolumeSource};
use crate::quantity::parse_units;
use crate::workload::{Container, EnvVar, ProbeSpec, Volume, VolumeMount};
use crate::{Error, Result};

use super::READINESS_FILE;

/// Name of the host-path volume holding the node's shared state directory
pub const SHARE_DIR_VOLUME: &str = "virt-share-dir";

/// Name of the emptyDir volume holding libvirt runtime state
pub const LIBVIRT_RUNTIME_VOLUME: &str = "libvirt-runtime";

/// Where libvirt runtime state is mounted in the launcher
pub const LIBVIRT_RUNTIME_PATH: &str = "/var/run/libvirt";

/// Directory under which each VM disk is mounted in the launcher
pub const VM_DISKS_DIR: &str = "/var/run/kubevirt-private/vm-disks";

/// Where a registry disk sidecar mounts the volume it fills
const REGISTRY_DISK_MOUNT: &str = "/disk";

/// File the registry disk sidecar copies the disk image to
const REGISTRY_DISK_COPY_PATH: &str = "/disk/disk-image";

/// Volumes, launcher mounts, and sidecars rendered for one VM
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderedVolumes {
    /// Pod volumes: VM volumes in order, then the infrastructure volumes
    pub volumes: Vec<Volume>,
    /// Launcher container mounts, share directory first
    pub mounts: Vec<VolumeMount>,
    /// Registry disk sidecar containers, in volume order
    pub sidecars: Vec<Container>,
}

/// Collect the image pull secrets a launcher pod needs.
///
/// Secrets declared by VM volumes come first, in declaration order, followed
/// by `default_secret`. Each name appears once, at its first position.
pub fn collect_pull_secrets(volumes: &[crd::Volume], default_secret: Option<&str>) -> Vec<String> {
    let declared = volumes
        .iter()
        .filter_map(|volume| volume.source.image_pull_secret());

    let mut seen = HashSet::new();
    let mut secrets = Vec::new();
    for name in declared.chain(default_secret) {
        if !name.is_empty() && seen.insert(name) {
            secrets.push(name.to_string());
        }
    }
    secrets
}

/// Render pod volumes, launcher mounts, and sidecars for the VM's volumes.
pub fn render_volumes(vm_volumes: &[crd::Volume], share_dir: &str) -> Result<RenderedVolumes> {
    let mut rendered = RenderedVolumes {
        volumes: Vec::with_capacity(vm_volumes.len() + 2),
        mounts: vec![
            VolumeMount::new(SHARE_DIR_VOLUME, share_dir),
            VolumeMount::new(LIBVIRT_RUNTIME_VOLUME, LIBVIRT_RUNTIME_PATH),
        ],
        sidecars: Vec::new(),
    };

    let mut names = HashSet::new();
    for volume in vm_volumes {
        validate_name(&volume.name, &mut names)?;
        let name = volume.name.as_str();
        let disk_path = format!("{VM_DISKS_DIR}/{name}");

        match &volume.source {
            VolumeSource::PersistentVolumeClaim(pvc) => {
                if pvc.claim_name.is_empty() {
                    return Err(Error::invalid_volume(
                        name,
                        "persistentVolumeClaim.claimName must not be empty",
                    ));
                }
                rendered
                    .volumes
                    .push(Volume::from_pvc(name, &pvc.claim_name, pvc.read_only));
                rendered.mounts.push(VolumeMount {
                    read_only: pvc.read_only,
                    ..VolumeMount::new(name, disk_path)
                });
            }
            VolumeSource::RegistryDisk(disk) => {
                if disk.image.is_empty() {
                    return Err(Error::invalid_volume(
                        name,
                        "registryDisk.image must not be empty",
                    ));
                }
                rendered.volumes.push(Volume::from_empty_dir(name, None));
                rendered.mounts.push(VolumeMount::new(name, disk_path));
                rendered.sidecars.push(registry_disk_container(name, disk));
            }
            VolumeSource::EmptyDisk(disk) => {
                let capacity = parse_units(&disk.capacity).map_err(|e| {
                    Error::invalid_quantity(
                        format!("volumes[{name}].emptyDisk.capacity"),
                        &disk.capacity,
                        e,
                    )
                })?;
                if capacity == 0 {
                    return Err(Error::invalid_volume(
                        name,
                        "emptyDisk.capacity must be positive",
                    ));
                }
                rendered
                    .volumes
                    .push(Volume::from_empty_dir(name, Some(disk.capacity.clone())));
                rendered.mounts.push(VolumeMount::new(name, disk_path));
            }
        }
    }

    rendered
        .volumes
        .push(Volume::from_host_path(SHARE_DIR_VOLUME, share_dir));
    rendered
        .volumes
        .push(Volume::from_empty_dir(LIBVIRT_RUNTIME_VOLUME, None));

    Ok(rendered)
}

fn validate_name<'a>(name: &'a str, seen: &mut HashSet<&'a str>) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_volume(name, "volume name must not be empty"));
    }
    if name == SHARE_DIR_VOLUME || name == LIBVIRT_RUNTIME_VOLUME {
        return Err(Error::invalid_volume(
            name,
            "volume name is reserved for launcher infrastructure",
        ));
    }
    if !seen.insert(name) {
        return Err(Error::invalid_volume(name, "duplicate volume name"));
    }
    Ok(())
}

/// Sidecar that copies a registry disk into the volume shared with the launcher
fn registry_disk_container(volume_name: &str, disk: &RegistryDiskSource) -> Container {
    Container {
        name: format!("volume{volume_name}"),
        image: disk.image.clone(),
        image_pull_policy: Some(image_pull_policy(&disk.image)),
        env: vec![EnvVar::literal("COPY_PATH", REGISTRY_DISK_COPY_PATH)],
        readiness_probe: Some(ProbeSpec::file_exists(READINESS_FILE, 2, 5)),
        volume_mounts: vec![VolumeMount::new(volume_name, REGISTRY_DISK_MOUNT)],
        ..Default::default()
    }
}

/// Determine image pull policy based on image tag
fn image_pull_policy(image: &str) -> String {
    let tag = image.rsplit('/').next().unwrap_or(image);
    if image.contains('@') || (tag.contains(':') && !tag.ends_with(":latest")) {
        "IfNotPresent".to_string()
    } else {
        "Always".to_string()
    }
}
