//! `gcloud` CLI adapter.
//!
//! All provider calls go through the subprocess layer and request
//! `--format=json` wherever output matters, decoded against the typed rows in
//! [`super::types`]. Unexpected payloads are permanent errors, never scraped.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::subprocess::{ProcessCommandBuilder, ProcessOutput, ProcessRunner};

use super::types::{BillingAccount, BillingProjectRow, Quota, QuotaRow, ServiceAccountRow, ServiceRow};
use super::CloudProvider;

/// Metric service backing the project-creation quota probe.
const QUOTA_SERVICE: &str = "cloudresourcemanager.googleapis.com";

pub struct GcloudProvider {
    runner: Arc<dyn ProcessRunner>,
    bin: String,
    call_timeout: Duration,
}

impl GcloudProvider {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            bin: "gcloud".to_string(),
            call_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_bin(mut self, bin: &str) -> Self {
        self.bin = bin.to_string();
        self
    }

    async fn run_checked(&self, operation: &str, args: &[&str]) -> Result<ProcessOutput> {
        let command = ProcessCommandBuilder::new(&self.bin)
            .args(args)
            .env("CLOUDSDK_CORE_DISABLE_PROMPTS", "1")
            .timeout(self.call_timeout)
            .build();

        let output = self
            .runner
            .run(command)
            .await
            .map_err(|e| e.into_provider_error(operation))?;

        if output.success() {
            Ok(output)
        } else {
            Err(classify_failure(operation, &output))
        }
    }

    fn decode<T: DeserializeOwned>(operation: &str, payload: &str) -> Result<T> {
        serde_json::from_str(payload).map_err(|e| {
            Error::permanent(operation, format!("unexpected payload from provider: {e}"))
        })
    }
}

fn classify_failure(operation: &str, output: &ProcessOutput) -> Error {
    let detail = if output.stderr.trim().is_empty() {
        format!("exit status {:?}", output.status.code())
    } else {
        output.stderr.trim().to_string()
    };

    if is_transient_stderr(&output.stderr) {
        Error::transient(operation, detail)
    } else {
        Error::permanent(operation, detail)
    }
}

/// Stderr patterns that indicate a failure worth retrying.
fn is_transient_stderr(stderr: &str) -> bool {
    let transient_patterns = [
        "rate limit",
        "timeout",
        "timed out",
        "connection refused",
        "temporary failure",
        "network",
        "503",
        "429",
        "could not connect",
        "broken pipe",
        "internal error",
    ];

    let stderr_lower = stderr.to_lowercase();
    transient_patterns
        .iter()
        .any(|pattern| stderr_lower.contains(pattern))
}

#[async_trait]
impl CloudProvider for GcloudProvider {
    async fn create_project(&self, id: &str) -> Result<()> {
        self.run_checked("create-project", &["projects", "create", id, "--quiet"])
            .await?;
        Ok(())
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        self.run_checked("delete-project", &["projects", "delete", id, "--quiet"])
            .await?;
        Ok(())
    }

    async fn link_billing(&self, id: &str, account: &str) -> Result<()> {
        self.run_checked(
            "link-billing",
            &[
                "billing",
                "projects",
                "link",
                id,
                "--billing-account",
                account,
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_enabled_services(&self, id: &str) -> Result<Vec<String>> {
        let output = self
            .run_checked(
                "list-services",
                &[
                    "services",
                    "list",
                    "--enabled",
                    "--project",
                    id,
                    "--format=json",
                ],
            )
            .await?;
        let rows: Vec<ServiceRow> = Self::decode("list-services", &output.stdout)?;
        Ok(rows.into_iter().map(|row| row.config.name).collect())
    }

    async fn enable_service(&self, id: &str, service: &str) -> Result<()> {
        self.run_checked(
            "enable-service",
            &["services", "enable", service, "--project", id],
        )
        .await?;
        Ok(())
    }

    async fn create_service_identity(
        &self,
        project: &str,
        name: &str,
        display_name: &str,
    ) -> Result<()> {
        self.run_checked(
            "create-identity",
            &[
                "iam",
                "service-accounts",
                "create",
                name,
                "--project",
                project,
                "--display-name",
                display_name,
            ],
        )
        .await?;
        Ok(())
    }

    async fn service_identity_exists(&self, project: &str, email: &str) -> Result<bool> {
        let output = self
            .run_checked(
                "list-identities",
                &[
                    "iam",
                    "service-accounts",
                    "list",
                    "--project",
                    project,
                    "--format=json",
                ],
            )
            .await?;
        let rows: Vec<ServiceAccountRow> = Self::decode("list-identities", &output.stdout)?;
        Ok(rows.iter().any(|row| row.email == email))
    }

    async fn bind_role(&self, project: &str, member: &str, role: &str) -> Result<()> {
        let member_arg = format!("serviceAccount:{member}");
        self.run_checked(
            "bind-role",
            &[
                "projects",
                "add-iam-policy-binding",
                project,
                "--member",
                &member_arg,
                "--role",
                role,
                "--quiet",
            ],
        )
        .await?;
        Ok(())
    }

    async fn create_key(&self, project: &str, email: &str) -> Result<Vec<u8>> {
        // gcloud only writes keys to a file, so mint into a scratch dir and
        // hand the bytes to the caller.
        let scratch = tempfile::tempdir()?;
        let key_path = scratch.path().join("key.json");
        let key_path_str = key_path
            .to_str()
            .ok_or_else(|| Error::permanent("create-key", "scratch path is not valid UTF-8"))?;

        self.run_checked(
            "create-key",
            &[
                "iam",
                "service-accounts",
                "keys",
                "create",
                key_path_str,
                "--iam-account",
                email,
                "--project",
                project,
            ],
        )
        .await?;

        let bytes = tokio::fs::read(&key_path).await?;
        Ok(bytes)
    }

    async fn list_billing_accounts(&self, open_only: bool) -> Result<Vec<BillingAccount>> {
        let output = self
            .run_checked(
                "list-billing-accounts",
                &["billing", "accounts", "list", "--format=json"],
            )
            .await?;
        let mut accounts: Vec<BillingAccount> =
            Self::decode("list-billing-accounts", &output.stdout)?;
        if open_only {
            accounts.retain(|account| account.open);
        }
        Ok(accounts)
    }

    async fn list_billing_projects(&self, account: &str) -> Result<Vec<String>> {
        let output = self
            .run_checked(
                "list-billing-projects",
                &[
                    "billing",
                    "projects",
                    "list",
                    "--billing-account",
                    account,
                    "--format=json",
                ],
            )
            .await?;
        let rows: Vec<BillingProjectRow> = Self::decode("list-billing-projects", &output.stdout)?;
        Ok(rows.into_iter().map(|row| row.project_id).collect())
    }

    async fn project_quota(&self, consumer_project: &str) -> Result<Quota> {
        let consumer = format!("projects/{consumer_project}");
        let result = self
            .run_checked(
                "project-quota",
                &[
                    "services",
                    "quota",
                    "list",
                    "--service",
                    QUOTA_SERVICE,
                    "--consumer",
                    &consumer,
                    "--format=json",
                ],
            )
            .await;

        // The quota surface is uneven across accounts; an unobtainable limit
        // is not an error, it just means no provider clamp.
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!("quota probe failed, treating as unknown: {e}");
                return Ok(Quota::Unknown);
            }
        };

        let rows: Vec<QuotaRow> = match Self::decode("project-quota", &output.stdout) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::debug!("quota payload unreadable, treating as unknown: {e}");
                return Ok(Quota::Unknown);
            }
        };

        for row in rows {
            if let Some(limit) = row.effective_limit.as_deref() {
                if let Ok(n) = limit.parse::<i64>() {
                    if n >= 0 {
                        return Ok(Quota::Limit(n as u32));
                    }
                }
            }
        }
        Ok(Quota::Unknown)
    }

    async fn check_available(&self) -> Result<()> {
        self.run_checked("check-provider", &["--version"])
            .await
            .map_err(|_| {
                Error::permanent(
                    "check-provider",
                    format!(
                        "{} CLI not found. Install the Google Cloud SDK:\n\
                         \n\
                         1. Visit: https://cloud.google.com/sdk/docs/install\n\
                         2. Run 'gcloud init' to authenticate\n\
                         3. Ensure '{}' is in your PATH",
                        self.bin, self.bin
                    ),
                )
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::SubprocessManager;

    fn provider_with_mock() -> (GcloudProvider, crate::subprocess::MockProcessRunner) {
        let (manager, mock) = SubprocessManager::mock();
        (GcloudProvider::new(manager.runner()), mock)
    }

    #[test]
    fn transient_stderr_detection() {
        assert!(is_transient_stderr("ERROR: rate limit exceeded"));
        assert!(is_transient_stderr("HTTP 503 Service Unavailable"));
        assert!(is_transient_stderr("connection refused by server"));
        assert!(!is_transient_stderr("ERROR: invalid project id"));
        assert!(!is_transient_stderr("PERMISSION_DENIED"));
    }

    #[tokio::test]
    async fn rate_limited_call_is_classified_transient() {
        let (provider, mock) = provider_with_mock();
        mock.expect("gcloud")
            .with_args_containing(&["projects", "create"])
            .fails(1, "ERROR: rate limit exceeded, try again later")
            .finish();

        let err = provider.create_project("demo-1").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn denied_call_is_classified_permanent() {
        let (provider, mock) = provider_with_mock();
        mock.expect("gcloud")
            .with_args_containing(&["billing", "projects", "link"])
            .fails(1, "ERROR: permission denied on billing account")
            .finish();

        let err = provider.link_billing("demo-1", "01AB23").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn enabled_services_decode_from_typed_payload() {
        let (provider, mock) = provider_with_mock();
        mock.expect("gcloud")
            .with_args_containing(&["services", "list"])
            .succeeds_with(
                r#"[{"config":{"name":"iam.googleapis.com"},"state":"ENABLED"},
                    {"config":{"name":"serviceusage.googleapis.com"},"state":"ENABLED"}]"#,
            )
            .finish();

        let services = provider.list_enabled_services("demo-1").await.unwrap();
        assert_eq!(
            services,
            vec!["iam.googleapis.com", "serviceusage.googleapis.com"]
        );
    }

    #[tokio::test]
    async fn malformed_payload_is_permanent() {
        let (provider, mock) = provider_with_mock();
        mock.expect("gcloud")
            .with_args_containing(&["services", "list"])
            .succeeds_with("Listed 0 items.")
            .finish();

        let err = provider.list_enabled_services("demo-1").await.unwrap_err();
        assert!(matches!(err, Error::Permanent { .. }));
    }

    #[tokio::test]
    async fn identity_lookup_matches_email() {
        let (provider, mock) = provider_with_mock();
        mock.expect("gcloud")
            .with_args_containing(&["service-accounts", "list"])
            .succeeds_with(r#"[{"email":"automation@demo-1.iam.gserviceaccount.com"}]"#)
            .finish();

        assert!(provider
            .service_identity_exists("demo-1", "automation@demo-1.iam.gserviceaccount.com")
            .await
            .unwrap());
        assert!(!provider
            .service_identity_exists("demo-1", "other@demo-1.iam.gserviceaccount.com")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn open_only_filters_closed_accounts() {
        let (provider, mock) = provider_with_mock();
        mock.expect("gcloud")
            .with_args_containing(&["billing", "accounts", "list"])
            .succeeds_with(
                r#"[{"name":"billingAccounts/OPEN01","displayName":"a","open":true},
                    {"name":"billingAccounts/CLOSED1","displayName":"b","open":false}]"#,
            )
            .finish();

        let accounts = provider.list_billing_accounts(true).await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id(), "OPEN01");
    }

    #[tokio::test]
    async fn quota_probe_failure_maps_to_unknown() {
        let (provider, mock) = provider_with_mock();
        mock.expect("gcloud")
            .with_args_containing(&["quota", "list"])
            .fails(1, "ERROR: quota service not enabled")
            .finish();

        assert_eq!(provider.project_quota("seed").await.unwrap(), Quota::Unknown);
    }

    #[tokio::test]
    async fn quota_probe_parses_effective_limit() {
        let (provider, mock) = provider_with_mock();
        mock.expect("gcloud")
            .with_args_containing(&["quota", "list"])
            .succeeds_with(r#"[{"effectiveLimit":"12"}]"#)
            .finish();

        assert_eq!(
            provider.project_quota("seed").await.unwrap(),
            Quota::Limit(12)
        );
    }

    #[tokio::test]
    async fn unlimited_quota_maps_to_unknown() {
        let (provider, mock) = provider_with_mock();
        mock.expect("gcloud")
            .with_args_containing(&["quota", "list"])
            .succeeds_with(r#"[{"effectiveLimit":"-1"}]"#)
            .finish();

        assert_eq!(provider.project_quota("seed").await.unwrap(), Quota::Unknown);
    }

    #[tokio::test]
    async fn delete_project_passes_quiet() {
        let (provider, mock) = provider_with_mock();
        mock.expect("gcloud").succeeds().finish();

        provider.delete_project("demo-1").await.unwrap();
        assert_eq!(
            mock.calls_matching(|c| c.args.iter().any(|a| a == "--quiet")
                && c.args.iter().any(|a| a == "delete")),
            1
        );
    }
}
