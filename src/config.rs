//! Launcher template configuration
//!
//! Process-wide settings fixed when the controller starts: which launcher
//! image to run, where the node's shared state directory lives, and which
//! pull secret every launcher pod needs. A [`TemplateConfig`] is immutable
//! once handed to a [`TemplateService`](crate::template::TemplateService).

use serde::{Deserialize, Serialize};

use crate::overhead::MemoryOverhead;
use crate::{Error, Result};

/// Default launcher image
pub const DEFAULT_LAUNCHER_IMAGE: &str = "kubevirt/virt-launcher";

/// Default shared state directory on each node
pub const DEFAULT_SHARE_DIR: &str = "/var/run/kubevirt";

/// Default prefix for generated launcher pod names
pub const DEFAULT_NAME_PREFIX: &str = "virt-launcher";

/// Settings for rendering launcher pods
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemplateConfig {
    /// Launcher container image
    pub launcher_image: String,

    /// Host directory shared between launcher pods and node agents
    pub share_dir: String,

    /// Pull secret added to every launcher pod
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<String>,

    /// Prefix for generated pod names
    pub name_prefix: String,

    /// Hypervisor memory overhead calibration
    pub memory_overhead: MemoryOverhead,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            launcher_image: DEFAULT_LAUNCHER_IMAGE.to_string(),
            share_dir: DEFAULT_SHARE_DIR.to_string(),
            image_pull_secret: None,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            memory_overhead: MemoryOverhead::default(),
        }
    }
}

impl TemplateConfig {
    /// Create a config for the given launcher image and share directory
    pub fn new(launcher_image: impl Into<String>, share_dir: impl Into<String>) -> Self {
        Self {
            launcher_image: launcher_image.into(),
            share_dir: share_dir.into(),
            ..Default::default()
        }
    }

    /// Set the pull secret added to every launcher pod
    pub fn with_image_pull_secret(mut self, secret: impl Into<String>) -> Self {
        self.image_pull_secret = Some(secret.into());
        self
    }

    /// Set the generated name prefix
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Set the memory overhead calibration
    pub fn with_memory_overhead(mut self, overhead: MemoryOverhead) -> Self {
        self.memory_overhead = overhead;
        self
    }

    /// Parse a config from YAML, filling unset fields with defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::validation(format!("invalid template config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.launcher_image.is_empty() {
            return Err(Error::validation("launcherImage must not be empty"));
        }
        if self.share_dir.is_empty() {
            return Err(Error::validation("shareDir must not be empty"));
        }
        if !self.share_dir.starts_with('/') {
            return Err(Error::validation(format!(
                "shareDir must be an absolute path, got '{}'",
                self.share_dir
            )));
        }
        if self.name_prefix.is_empty() {
            return Err(Error::validation("namePrefix must not be empty"));
        }
        if self.memory_overhead.pagetable_divisor == 0 {
            return Err(Error::validation(
                "memoryOverhead.pagetableDivisor must be positive",
            ));
        }
        Ok(())
    }
}
