//! Test fixtures shared by unit and integration tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::provider::{BillingAccount, CloudProvider, Quota};

/// Scriptable in-memory provider.
///
/// Failures are injected per operation name (transient, so the retry
/// executor exercises its backoff) or per role (permanent, for partial-grant
/// scenarios). Call counters let tests assert how often the workflow touched
/// the provider.
pub struct FakeProvider {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    fail_plans: HashMap<String, FailPlan>,
    fail_roles: HashSet<String>,
    preset_enabled: Vec<String>,
    preset_identities: HashSet<String>,
    created: Vec<String>,
    deleted: Vec<String>,
    billing_accounts: Vec<BillingAccount>,
    billing_projects: Vec<String>,
    quota: Option<u32>,
    key_bytes: Vec<u8>,
    create_attempts: u32,
    link_attempts: u32,
    enable_calls: u32,
    identity_creations: u32,
    roles_granted: u32,
}

enum FailPlan {
    Times(u32),
    Always,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        let inner = Inner {
            billing_accounts: vec![BillingAccount {
                name: "billingAccounts/B1".to_string(),
                display_name: "Test".to_string(),
                open: true,
            }],
            key_bytes: br#"{"type":"service_account","private_key":"fake"}"#.to_vec(),
            ..Default::default()
        };
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Inject `times` transient failures for `operation` before it succeeds.
    pub fn fail_times(&self, operation: &str, times: u32) {
        self.inner
            .lock()
            .unwrap()
            .fail_plans
            .insert(operation.to_string(), FailPlan::Times(times));
    }

    /// Make `operation` fail transiently on every call.
    pub fn fail_always(&self, operation: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_plans
            .insert(operation.to_string(), FailPlan::Always);
    }

    /// Make binding `role` fail permanently.
    pub fn fail_role(&self, role: &str) {
        self.inner.lock().unwrap().fail_roles.insert(role.to_string());
    }

    /// Report these services as already enabled on every project.
    pub fn preset_enabled(&self, services: &[&str]) {
        self.inner.lock().unwrap().preset_enabled =
            services.iter().map(|s| s.to_string()).collect();
    }

    /// Report this identity as already existing.
    pub fn preset_identity(&self, email: &str) {
        self.inner
            .lock()
            .unwrap()
            .preset_identities
            .insert(email.to_string());
    }

    pub fn set_quota(&self, limit: u32) {
        self.inner.lock().unwrap().quota = Some(limit);
    }

    pub fn set_billing_projects(&self, projects: &[&str]) {
        self.inner.lock().unwrap().billing_projects =
            projects.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_billing_accounts(&self, accounts: Vec<BillingAccount>) {
        self.inner.lock().unwrap().billing_accounts = accounts;
    }

    pub fn created_projects(&self) -> Vec<String> {
        self.inner.lock().unwrap().created.clone()
    }

    pub fn deleted_projects(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted.clone()
    }

    pub fn create_attempts(&self) -> u32 {
        self.inner.lock().unwrap().create_attempts
    }

    pub fn link_attempts(&self) -> u32 {
        self.inner.lock().unwrap().link_attempts
    }

    pub fn enable_calls(&self) -> u32 {
        self.inner.lock().unwrap().enable_calls
    }

    pub fn identity_creations(&self) -> u32 {
        self.inner.lock().unwrap().identity_creations
    }

    pub fn roles_granted(&self) -> u32 {
        self.inner.lock().unwrap().roles_granted
    }

    fn check_plan(inner: &mut Inner, operation: &str) -> Result<()> {
        match inner.fail_plans.get_mut(operation) {
            Some(FailPlan::Always) => Err(Error::transient(operation, "injected failure")),
            Some(FailPlan::Times(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(Error::transient(operation, "injected failure"))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CloudProvider for FakeProvider {
    async fn create_project(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.create_attempts += 1;
        Self::check_plan(&mut inner, "create_project")?;
        inner.created.push(id.to_string());
        Ok(())
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_plan(&mut inner, "delete_project")?;
        inner.deleted.push(id.to_string());
        Ok(())
    }

    async fn link_billing(&self, _id: &str, _account: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.link_attempts += 1;
        Self::check_plan(&mut inner, "link_billing")
    }

    async fn list_enabled_services(&self, _id: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_plan(&mut inner, "list_enabled_services")?;
        Ok(inner.preset_enabled.clone())
    }

    async fn enable_service(&self, _id: &str, _service: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.enable_calls += 1;
        Self::check_plan(&mut inner, "enable_service")
    }

    async fn create_service_identity(
        &self,
        _project: &str,
        _name: &str,
        _display_name: &str,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.identity_creations += 1;
        Self::check_plan(&mut inner, "create_service_identity")
    }

    async fn service_identity_exists(&self, _project: &str, email: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_plan(&mut inner, "service_identity_exists")?;
        Ok(inner.preset_identities.contains(email))
    }

    async fn bind_role(&self, _project: &str, _member: &str, role: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_plan(&mut inner, "bind_role")?;
        if inner.fail_roles.contains(role) {
            return Err(Error::permanent("bind_role", format!("{role} denied")));
        }
        inner.roles_granted += 1;
        Ok(())
    }

    async fn create_key(&self, _project: &str, _email: &str) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_plan(&mut inner, "create_key")?;
        Ok(inner.key_bytes.clone())
    }

    async fn list_billing_accounts(&self, open_only: bool) -> Result<Vec<BillingAccount>> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_plan(&mut inner, "list_billing_accounts")?;
        let mut accounts = inner.billing_accounts.clone();
        if open_only {
            accounts.retain(|account| account.open);
        }
        Ok(accounts)
    }

    async fn list_billing_projects(&self, _account: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_plan(&mut inner, "list_billing_projects")?;
        Ok(inner.billing_projects.clone())
    }

    async fn project_quota(&self, _consumer_project: &str) -> Result<Quota> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_plan(&mut inner, "project_quota")?;
        Ok(match inner.quota {
            Some(limit) => Quota::Limit(limit),
            None => Quota::Unknown,
        })
    }

    async fn check_available(&self) -> Result<()> {
        Ok(())
    }
}
