//! Batch controller: quota accounting and sequential iteration over units.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::keystore::CredentialArtifact;
use crate::naming::new_id;
use crate::provider::{CloudProvider, Quota};
use crate::sequencer::Sequencer;

/// One batch invocation's worth of input; immutable.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub name_prefix: String,
    pub count: u32,
    pub billing_account: String,
}

/// Accumulated outcome of a batch run, owned by the controller.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: u32,
    pub failed: u32,
    pub artifacts: Vec<CredentialArtifact>,
}

impl BatchSummary {
    pub fn total(&self) -> u32 {
        self.succeeded + self.failed
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum projects allowed under one billing account.
    pub account_ceiling: u32,
    /// Pause between units to ease rate-limit pressure.
    pub iteration_pause: Duration,
    /// Existing project used as the quota probe's consumer scope.
    pub quota_project: Option<String>,
}

pub struct BatchController {
    provider: Arc<dyn CloudProvider>,
    sequencer: Sequencer,
    options: BatchOptions,
    interrupted: Arc<AtomicBool>,
}

impl BatchController {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        sequencer: Sequencer,
        options: BatchOptions,
        interrupted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            provider,
            sequencer,
            options,
            interrupted,
        }
    }

    /// Provision up to `request.count` units, clamped by quota and by the
    /// per-account ceiling. Individual unit failures never stop the batch;
    /// only pre-batch accounting aborts the run.
    pub async fn run(&self, request: &ProvisionRequest) -> Result<BatchSummary> {
        let quota = self.probe_quota().await;
        let existing = self
            .provider
            .list_billing_projects(&request.billing_account)
            .await?
            .len() as u32;

        let effective = effective_count(
            request.count,
            quota,
            existing,
            self.options.account_ceiling,
        )?;
        if effective < request.count {
            tracing::info!(
                "clamping batch from {} to {} units (quota {quota:?}, {existing} existing under {}, ceiling {})",
                request.count,
                effective,
                request.billing_account,
                self.options.account_ceiling
            );
        }

        let mut summary = BatchSummary::default();
        for iteration in 1..=effective {
            if self.interrupted.load(Ordering::SeqCst) {
                tracing::warn!(
                    "interrupt received, stopping after {} of {effective} units",
                    summary.total()
                );
                break;
            }

            let id = new_id(&request.name_prefix);
            tracing::info!("unit {iteration}/{effective}: {id}");

            match self.sequencer.provision(&id, &request.billing_account).await {
                Ok(artifact) => {
                    summary.succeeded += 1;
                    summary.artifacts.push(artifact);
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!("unit {id} failed: {e}");
                }
            }

            if iteration < effective {
                tokio::time::sleep(self.options.iteration_pause).await;
            }
        }

        tracing::info!(
            "batch complete: {} succeeded, {} failed of {} attempted",
            summary.succeeded,
            summary.failed,
            summary.total()
        );
        Ok(summary)
    }

    async fn probe_quota(&self) -> Quota {
        let Some(project) = self.options.quota_project.as_deref() else {
            return Quota::Unknown;
        };
        match self.provider.project_quota(project).await {
            Ok(quota) => quota,
            Err(e) => {
                tracing::debug!("quota probe errored, proceeding unclamped: {e}");
                Quota::Unknown
            }
        }
    }
}

/// Clamp the requested count by the provider quota and the per-account
/// headroom. Zero headroom is fatal before any unit is attempted.
fn effective_count(requested: u32, quota: Quota, existing: u32, ceiling: u32) -> Result<u32> {
    let mut effective = requested;
    if let Quota::Limit(limit) = quota {
        effective = effective.min(limit);
    }

    let headroom = ceiling.saturating_sub(existing);
    if headroom == 0 {
        return Err(Error::QuotaExceeded(format!(
            "{existing} projects already provisioned under this account (ceiling {ceiling})"
        )));
    }
    Ok(effective.min(headroom))
}
