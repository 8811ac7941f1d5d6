//! Cloud provider capability consumed by the provisioning workflow.
//!
//! Every call is fallible and classified transient or permanent so the retry
//! executor can decide whether another attempt is worthwhile.

pub mod gcloud;
pub mod types;

pub use gcloud::GcloudProvider;
pub use types::{BillingAccount, Quota};

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn create_project(&self, id: &str) -> Result<()>;

    /// Best-effort rollback target; callers typically ignore the error.
    async fn delete_project(&self, id: &str) -> Result<()>;

    async fn link_billing(&self, id: &str, account: &str) -> Result<()>;

    async fn list_enabled_services(&self, id: &str) -> Result<Vec<String>>;

    async fn enable_service(&self, id: &str, service: &str) -> Result<()>;

    async fn create_service_identity(
        &self,
        project: &str,
        name: &str,
        display_name: &str,
    ) -> Result<()>;

    async fn service_identity_exists(&self, project: &str, email: &str) -> Result<bool>;

    async fn bind_role(&self, project: &str, member: &str, role: &str) -> Result<()>;

    /// Mint a credential key for the identity and return its raw bytes.
    async fn create_key(&self, project: &str, email: &str) -> Result<Vec<u8>>;

    async fn list_billing_accounts(&self, open_only: bool) -> Result<Vec<BillingAccount>>;

    /// Projects already linked to `account`, for ceiling accounting.
    async fn list_billing_projects(&self, account: &str) -> Result<Vec<String>>;

    /// Probe the project-creation limit, consumer-scoped to an existing
    /// project. An unobtainable limit is `Quota::Unknown`, not an error.
    async fn project_quota(&self, consumer_project: &str) -> Result<Quota>;

    /// Verify the underlying CLI is installed and callable.
    async fn check_available(&self) -> Result<()>;
}

/// Deterministic email of a project-scoped service identity.
pub fn identity_email(project: &str, name: &str) -> String {
    format!("{name}@{project}.iam.gserviceaccount.com")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_email_is_deterministic() {
        assert_eq!(
            identity_email("v6-ab12cd34", "automation"),
            "automation@v6-ab12cd34.iam.gserviceaccount.com"
        );
    }
}
