//! Launcher pod rendering
//!
//! [`TemplateService`] turns a [`VirtualMachine`] into the pod manifest that
//! runs its hypervisor process. Rendering is a pure function of the VM and the
//! service's [`TemplateConfig`]: nothing is read from the cluster, and the same
//! input always yields the same pod.
//!
//! The launcher pod carries:
//! - controller labels and annotations tying it back to the VM
//! - a `compute` container running the launcher entrypoint
//! - memory requests and limits inflated by the hypervisor overhead
//! - the VM's volumes plus the node share directory and libvirt runtime state
//! - one copy sidecar per registry disk
//! - the union of the VM's and the controller's image pull secrets

pub mod volumes;

use kube::ResourceExt;
use tracing::{debug, instrument};

use crate::config::TemplateConfig;
use crate::crd::{
    self, DomainSpec, VirtualMachine, APP_LABEL, CREATED_BY_ANNOTATION, DOMAIN_LABEL,
    NODE_SCHEDULABLE_LABEL, OWNED_BY_ANNOTATION,
};
use crate::quantity::{parse_units, Quantity};
use crate::workload::{
    Container, LocalObjectReference, ObjectMeta, Pod, PodSpec, ProbeSpec, ResourceQuantity,
    ResourceRequirements, SecurityContext,
};
use crate::{Error, Result};

pub use volumes::{collect_pull_secrets, render_volumes, RenderedVolumes};

/// Value of the app label on every launcher pod
pub const LAUNCHER_APP: &str = "virt-launcher";

/// Value of the owned-by annotation on every launcher pod
pub const OWNER: &str = "virt-controller";

/// Name of the container running the launcher
pub const LAUNCHER_CONTAINER: &str = "compute";

/// File the launcher and registry disk sidecars create once ready
pub const READINESS_FILE: &str = "/tmp/healthy";

/// Seconds Kubernetes waits between SIGTERM and SIGKILL
pub const POD_GRACE_PERIOD_SECONDS: i64 = 60;

/// Seconds the launcher gives the guest to shut down.
///
/// Kept below [`POD_GRACE_PERIOD_SECONDS`] so the launcher can clean up
/// before the kubelet kills it.
pub const LAUNCHER_GRACE_PERIOD_SECONDS: i64 = 45;

const LAUNCHER_ENTRYPOINT: &str = "/entrypoint.sh";
const QEMU_TIMEOUT: &str = "5m";

/// Renders launcher pods for VirtualMachines
#[derive(Clone, Debug)]
pub struct TemplateService {
    config: TemplateConfig,
}

impl TemplateService {
    /// Create a service from a validated config
    pub fn new(config: TemplateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The config this service renders with
    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    /// Render the launcher pod for a VirtualMachine.
    ///
    /// The VM must carry a name and namespace. Its UID is recorded in the
    /// created-by annotation and left empty when the VM has not been persisted.
    #[instrument(skip_all, fields(vm = %vm.name_any(), namespace = ?vm.metadata.namespace))]
    pub fn render_launch_manifest(&self, vm: &VirtualMachine) -> Result<Pod> {
        let name = required(vm.metadata.name.as_deref(), "metadata.name")?;
        let namespace = required(vm.metadata.namespace.as_deref(), "metadata.namespace")?;
        let uid = vm.metadata.uid.as_deref().unwrap_or_default();
        let spec = &vm.spec;

        let resources = render_resources(&self.config, &spec.domain)?;
        let rendered = render_volumes(&spec.volumes, &self.config.share_dir)?;
        let image_pull_secrets = collect_pull_secrets(
            &spec.volumes,
            self.config.image_pull_secret.as_deref(),
        )
        .into_iter()
        .map(|name| LocalObjectReference { name })
        .collect();

        let launcher = Container {
            name: LAUNCHER_CONTAINER.to_string(),
            image: self.config.launcher_image.clone(),
            command: Some(launcher_command(name, namespace, &self.config.share_dir)),
            resources,
            readiness_probe: Some(ProbeSpec::file_exists(READINESS_FILE, 2, 2)),
            volume_mounts: rendered.mounts,
            security_context: Some(SecurityContext {
                privileged: Some(true),
            }),
            ..Default::default()
        };
        let mut containers = Vec::with_capacity(rendered.sidecars.len() + 1);
        containers.push(launcher);
        containers.extend(rendered.sidecars);

        let mut node_selector = spec.node_selector.clone();
        node_selector.insert(NODE_SCHEDULABLE_LABEL.to_string(), "true".to_string());

        let hostname = spec
            .hostname
            .as_deref()
            .filter(|h| !h.is_empty())
            .unwrap_or(name)
            .to_string();

        let pod_spec = PodSpec {
            containers,
            volumes: rendered.volumes,
            node_selector,
            affinity: spec.affinity.clone(),
            hostname,
            subdomain: spec.subdomain.clone().unwrap_or_default(),
            termination_grace_period_seconds: Some(POD_GRACE_PERIOD_SECONDS),
            restart_policy: Some("Never".to_string()),
            image_pull_secrets,
        };

        let metadata = self.launcher_metadata(vm, name, namespace, uid);

        debug!(
            containers = pod_spec.containers.len(),
            volumes = pod_spec.volumes.len(),
            pull_secrets = pod_spec.image_pull_secrets.len(),
            "Rendered launcher pod"
        );

        Ok(Pod::new(metadata, pod_spec))
    }

    /// VM labels overlaid with the controller's labels and annotations
    fn launcher_metadata(
        &self,
        vm: &VirtualMachine,
        name: &str,
        namespace: &str,
        uid: &str,
    ) -> ObjectMeta {
        let mut metadata = ObjectMeta::generated(
            format!("{}-{}-", self.config.name_prefix, name),
            namespace,
        );
        metadata.labels = vm.labels().clone();
        metadata
            .with_label(APP_LABEL, LAUNCHER_APP)
            .with_label(DOMAIN_LABEL, name)
            .with_annotation(CREATED_BY_ANNOTATION, uid)
            .with_annotation(OWNED_BY_ANNOTATION, OWNER)
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::missing_field(field))
}

/// Command vector for the launcher entrypoint
fn launcher_command(name: &str, namespace: &str, share_dir: &str) -> Vec<String> {
    let grace_period = LAUNCHER_GRACE_PERIOD_SECONDS.to_string();
    [
        LAUNCHER_ENTRYPOINT,
        "--qemu-timeout",
        QEMU_TIMEOUT,
        "--name",
        name,
        "--namespace",
        namespace,
        "--kubevirt-share-dir",
        share_dir,
        "--readiness-file",
        READINESS_FILE,
        "--grace-period-seconds",
        &grace_period,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Launcher container resources for the guest.
///
/// CPU quantities are validated and passed through. Memory requests and
/// limits each get the overhead for the guest added; unset fields stay unset.
fn render_resources(
    config: &TemplateConfig,
    domain: &DomainSpec,
) -> Result<Option<ResourceRequirements>> {
    let resources = &domain.resources;
    if resources.requests.is_none() && resources.limits.is_none() {
        return Ok(None);
    }

    let guest_memory = match resources.guest_memory() {
        Some(quantity) => parse_units(quantity)
            .map_err(|e| Error::invalid_quantity("domain.resources.memory", quantity, e))?,
        None => 0,
    };
    let cores = domain.cores();

    let adjust = |field: &str, quantity: &crd::ResourceQuantity| -> Result<ResourceQuantity> {
        if let Some(cpu) = &quantity.cpu {
            cpu.parse::<Quantity>()
                .map_err(|e| Error::invalid_quantity(format!("{field}.cpu"), cpu, e))?;
        }
        let memory = quantity
            .memory
            .as_deref()
            .map(|memory| {
                config
                    .memory_overhead
                    .adjust_memory(memory, guest_memory, cores)
                    .map_err(|e| Error::invalid_quantity(format!("{field}.memory"), memory, e))
            })
            .transpose()?;
        Ok(ResourceQuantity {
            cpu: quantity.cpu.clone(),
            memory,
        })
    };

    Ok(Some(ResourceRequirements {
        requests: resources
            .requests
            .as_ref()
            .map(|r| adjust("domain.resources.requests", r))
            .transpose()?,
        limits: resources
            .limits
            .as_ref()
            .map(|l| adjust("domain.resources.limits", l))
            .transpose()?,
    }))
}
