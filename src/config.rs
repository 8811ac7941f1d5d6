//! Run configuration: defaults, optional TOML file, CLI overrides on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Prefix for derived project ids; must start with a letter.
    pub name_prefix: String,

    /// Units to provision in this batch.
    pub count: u32,

    /// Billing account id; the first open account is used when unset.
    pub billing_account: Option<String>,

    /// Directory receiving minted keys and the manifest.
    pub key_dir: PathBuf,

    /// Retry attempts per provider operation.
    pub max_attempts: u32,

    /// Base delay for the linear retry backoff.
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,

    /// Pause between units to ease rate-limit pressure.
    #[serde(with = "humantime_serde")]
    pub iteration_pause: Duration,

    /// Maximum projects allowed under one billing account.
    pub account_ceiling: u32,

    pub identity_name: String,
    pub identity_display_name: String,

    /// Services enabled on every new project.
    pub services: Vec<String>,

    /// Roles bound to the service identity on every new project.
    pub roles: Vec<String>,

    /// Existing project used as the consumer scope for the quota probe.
    pub quota_project: Option<String>,

    /// Provider CLI binary name.
    pub provider_bin: String,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            name_prefix: "prov".to_string(),
            count: 1,
            billing_account: None,
            key_dir: default_key_dir(),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            iteration_pause: Duration::from_secs(3),
            account_ceiling: 5,
            identity_name: "automation".to_string(),
            identity_display_name: "Automation service identity".to_string(),
            services: vec![
                "cloudresourcemanager.googleapis.com".to_string(),
                "serviceusage.googleapis.com".to_string(),
                "iam.googleapis.com".to_string(),
            ],
            roles: vec![
                "roles/editor".to_string(),
                "roles/iam.serviceAccountTokenCreator".to_string(),
            ],
            quota_project: None,
            provider_bin: "gcloud".to_string(),
        }
    }
}

fn default_key_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".provender")
        .join("keys")
}

impl ProvisionConfig {
    /// Load from a TOML file, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let config: Self = toml::from_str(&raw)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Reject configurations the provider would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if self.count < 1 {
            return Err(Error::Config("count must be at least 1".to_string()));
        }
        if self.name_prefix.is_empty()
            || !self.name_prefix.starts_with(|c: char| c.is_ascii_lowercase())
        {
            return Err(Error::Config(format!(
                "name prefix '{}' must start with a lowercase letter",
                self.name_prefix
            )));
        }
        if self.max_attempts < 1 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        if self.services.is_empty() {
            return Err(Error::Config("at least one service is required".to_string()));
        }
        Ok(())
    }
}
