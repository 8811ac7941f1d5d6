//! Ordered provisioning steps for a single unit, with rollback on failure.

pub mod unit;

pub use unit::{ProjectUnit, UnitState};

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::keystore::{CredentialArtifact, KeyStore};
use crate::provider::{identity_email, CloudProvider};
use crate::retry::{execute_with_retry, RetryPolicy};

pub struct Sequencer {
    provider: Arc<dyn CloudProvider>,
    keystore: Arc<KeyStore>,
    retry: RetryPolicy,
    services: Vec<String>,
    roles: Vec<String>,
    identity_name: String,
    identity_display_name: String,
}

impl Sequencer {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        keystore: Arc<KeyStore>,
        retry: RetryPolicy,
        services: Vec<String>,
        roles: Vec<String>,
        identity_name: String,
        identity_display_name: String,
    ) -> Self {
        Self {
            provider,
            keystore,
            retry,
            services,
            roles,
            identity_name,
            identity_display_name,
        }
    }

    /// Drive one unit through the full step chain.
    ///
    /// Returns the stored artifact on success. On failure the unit's project
    /// is deleted (best effort, unless it was never created) and the error
    /// carries the failing step's name.
    pub async fn provision(&self, id: &str, billing_account: &str) -> Result<CredentialArtifact> {
        let mut unit = ProjectUnit::new(id.to_string());
        tracing::info!("provisioning unit {id}");

        match self.run_steps(&mut unit, billing_account).await {
            Ok(artifact) => {
                tracing::info!("unit {id} complete, key at {}", artifact.file_path.display());
                Ok(artifact)
            }
            Err((step, source)) => {
                unit.fail();
                self.roll_back(&mut unit).await;
                Err(Error::StepFailed {
                    step,
                    unit: unit.id.clone(),
                    source: Box::new(source),
                })
            }
        }
    }

    async fn run_steps(
        &self,
        unit: &mut ProjectUnit,
        billing_account: &str,
    ) -> std::result::Result<CredentialArtifact, (&'static str, Error)> {
        let id = unit.id.clone();

        execute_with_retry(&self.retry, "create project", || {
            self.provider.create_project(&id)
        })
        .await
        .map_err(|e| ("create-project", e))?;
        unit.advance(UnitState::Created);

        execute_with_retry(&self.retry, "link billing", || {
            self.provider.link_billing(&id, billing_account)
        })
        .await
        .map_err(|e| ("link-billing", e))?;
        unit.advance(UnitState::BillingLinked);

        self.enable_services(&id)
            .await
            .map_err(|e| ("enable-services", e))?;
        unit.advance(UnitState::ServicesEnabled);

        let email = self
            .ensure_identity(&id)
            .await
            .map_err(|e| ("ensure-identity", e))?;
        unit.advance(UnitState::IdentityReady);

        self.bind_roles(&id, &email).await;
        unit.advance(UnitState::RolesBound);

        let artifact = self
            .mint_key(&id, &email)
            .await
            .map_err(|e| ("mint-key", e))?;
        unit.advance(UnitState::KeyMinted);

        Ok(artifact)
    }

    /// Enable each required service, skipping those already on.
    async fn enable_services(&self, id: &str) -> Result<()> {
        let enabled = execute_with_retry(&self.retry, "list enabled services", || {
            self.provider.list_enabled_services(id)
        })
        .await?;

        for service in &self.services {
            if enabled.iter().any(|s| s == service) {
                tracing::debug!("service {service} already enabled on {id}, skipping");
                continue;
            }
            execute_with_retry(&self.retry, &format!("enable {service}"), || {
                self.provider.enable_service(id, service)
            })
            .await?;
        }
        Ok(())
    }

    /// Create the service identity unless it already exists.
    async fn ensure_identity(&self, id: &str) -> Result<String> {
        let email = identity_email(id, &self.identity_name);

        let exists = execute_with_retry(&self.retry, "probe service identity", || {
            self.provider.service_identity_exists(id, &email)
        })
        .await?;

        if exists {
            tracing::debug!("identity {email} already present, skipping creation");
        } else {
            execute_with_retry(&self.retry, "create service identity", || {
                self.provider
                    .create_service_identity(id, &self.identity_name, &self.identity_display_name)
            })
            .await?;
        }
        Ok(email)
    }

    /// Bind each configured role; individual failures are warnings only and
    /// partial grants are tolerated.
    async fn bind_roles(&self, id: &str, email: &str) {
        let mut granted = 0usize;
        for role in &self.roles {
            let result = execute_with_retry(&self.retry, &format!("bind {role}"), || {
                self.provider.bind_role(id, email, role)
            })
            .await;

            match result {
                Ok(()) => granted += 1,
                Err(e) => {
                    tracing::warn!("role {role} not granted on {id}: {e}");
                }
            }
        }
        if granted < self.roles.len() {
            tracing::warn!(
                "unit {id}: {granted}/{} roles granted, continuing with partial grants",
                self.roles.len()
            );
        }
    }

    async fn mint_key(&self, id: &str, email: &str) -> Result<CredentialArtifact> {
        let bytes = execute_with_retry(&self.retry, "mint credential key", || {
            self.provider.create_key(id, email)
        })
        .await?;
        self.keystore.save(id, &bytes)
    }

    /// Delete the unit's project; errors are logged and swallowed. Deleting
    /// the project also invalidates the identity and any issued key.
    async fn roll_back(&self, unit: &mut ProjectUnit) {
        if !unit.exists_remotely() {
            return;
        }
        match self.provider.delete_project(&unit.id).await {
            Ok(()) => {
                unit.mark_rolled_back();
                tracing::info!("rolled back unit {}", unit.id);
            }
            Err(e) => {
                tracing::warn!("rollback of {} did not complete: {e}", unit.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProvider;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }

    fn sequencer_with(
        provider: Arc<FakeProvider>,
        keystore: Arc<KeyStore>,
        roles: Vec<&str>,
    ) -> Sequencer {
        Sequencer::new(
            provider,
            keystore,
            fast_retry(),
            vec![
                "iam.googleapis.com".to_string(),
                "serviceusage.googleapis.com".to_string(),
            ],
            roles.into_iter().map(String::from).collect(),
            "automation".to_string(),
            "Automation service identity".to_string(),
        )
    }

    fn keystore(tmp: &TempDir) -> Arc<KeyStore> {
        Arc::new(KeyStore::open(tmp.path()).unwrap())
    }

    #[tokio::test]
    async fn happy_path_yields_one_artifact() {
        let tmp = TempDir::new().unwrap();
        let provider = Arc::new(FakeProvider::new());
        let sequencer = sequencer_with(provider.clone(), keystore(&tmp), vec!["roles/editor"]);

        let artifact = sequencer.provision("v6-ab12cd34", "B1").await.unwrap();
        assert_eq!(artifact.owner_unit_id, "v6-ab12cd34");
        assert!(artifact.file_path.exists());
        assert_eq!(provider.created_projects(), vec!["v6-ab12cd34"]);
        assert!(provider.deleted_projects().is_empty());
    }

    #[tokio::test]
    async fn billing_failure_rolls_back_project() {
        let tmp = TempDir::new().unwrap();
        let provider = Arc::new(FakeProvider::new());
        provider.fail_always("link_billing");
        let sequencer = sequencer_with(provider.clone(), keystore(&tmp), vec!["roles/editor"]);

        let err = sequencer.provision("v6-ab12cd34", "B1").await.unwrap_err();
        assert_eq!(err.step(), Some("link-billing"));
        assert_eq!(provider.deleted_projects(), vec!["v6-ab12cd34"]);
        assert_eq!(provider.link_attempts(), 3);
    }

    #[tokio::test]
    async fn create_failure_needs_no_rollback() {
        let tmp = TempDir::new().unwrap();
        let provider = Arc::new(FakeProvider::new());
        provider.fail_always("create_project");
        let sequencer = sequencer_with(provider.clone(), keystore(&tmp), vec!["roles/editor"]);

        let err = sequencer.provision("v6-ab12cd34", "B1").await.unwrap_err();
        assert_eq!(err.step(), Some("create-project"));
        assert!(provider.deleted_projects().is_empty());
    }

    #[tokio::test]
    async fn already_enabled_services_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let provider = Arc::new(FakeProvider::new());
        provider.preset_enabled(&["iam.googleapis.com", "serviceusage.googleapis.com"]);
        let sequencer = sequencer_with(provider.clone(), keystore(&tmp), vec!["roles/editor"]);

        sequencer.provision("v6-ab12cd34", "B1").await.unwrap();
        assert_eq!(provider.enable_calls(), 0);
    }

    #[tokio::test]
    async fn partial_role_grant_still_mints_key() {
        let tmp = TempDir::new().unwrap();
        let provider = Arc::new(FakeProvider::new());
        provider.fail_role("roles/storage.admin");
        let sequencer = sequencer_with(
            provider.clone(),
            keystore(&tmp),
            vec![
                "roles/editor",
                "roles/storage.admin",
                "roles/iam.serviceAccountTokenCreator",
                "roles/serviceusage.serviceUsageConsumer",
            ],
        );

        let artifact = sequencer.provision("v6-ab12cd34", "B1").await.unwrap();
        assert!(artifact.file_path.exists());
        assert_eq!(provider.roles_granted(), 3);
        assert!(provider.deleted_projects().is_empty());
    }

    #[tokio::test]
    async fn transient_create_failure_recovers_within_budget() {
        let tmp = TempDir::new().unwrap();
        let provider = Arc::new(FakeProvider::new());
        provider.fail_times("create_project", 2);
        let sequencer = sequencer_with(provider.clone(), keystore(&tmp), vec!["roles/editor"]);

        sequencer.provision("v6-ab12cd34", "B1").await.unwrap();
        assert_eq!(provider.create_attempts(), 3);
    }

    #[tokio::test]
    async fn existing_identity_is_not_recreated() {
        let tmp = TempDir::new().unwrap();
        let provider = Arc::new(FakeProvider::new());
        provider.preset_identity("automation@v6-ab12cd34.iam.gserviceaccount.com");
        let sequencer = sequencer_with(provider.clone(), keystore(&tmp), vec!["roles/editor"]);

        sequencer.provision("v6-ab12cd34", "B1").await.unwrap();
        assert_eq!(provider.identity_creations(), 0);
    }
}
