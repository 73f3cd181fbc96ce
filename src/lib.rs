//! virt-controller - launcher pod rendering for KubeVirt VirtualMachines
//!
//! Every running VirtualMachine is backed by a launcher pod that hosts its
//! hypervisor process. This crate holds the pure core of the controller that
//! creates those pods: it renders the pod manifest for a VM, sizes its memory
//! to cover hypervisor overhead, gathers the volumes and pull secrets it
//! needs, and answers cluster-wide policy questions from a cached ConfigMap.
//!
//! # Modules
//!
//! - [`crd`] - The VirtualMachine custom resource
//! - [`template`] - Launcher pod rendering
//! - [`overhead`] - Hypervisor memory overhead calculation
//! - [`quantity`] - Kubernetes resource quantity parsing
//! - [`cluster_config`] - Cluster settings read from the `kubevirt-config` ConfigMap
//! - [`workload`] - Pod manifest types
//! - [`config`] - Renderer configuration
//! - [`error`] - Error types for the controller

#![deny(missing_docs)]

pub mod cluster_config;
pub mod config;
pub mod crd;
pub mod error;
pub mod overhead;
pub mod quantity;
pub mod template;
pub mod workload;

pub use cluster_config::{is_emulation_allowed, ConfigMapCache};
pub use config::TemplateConfig;
pub use error::Error;
pub use template::TemplateService;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
