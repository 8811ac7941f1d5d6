//! Typed views of the provider CLI's JSON payloads.

use serde::Deserialize;

/// A billing account as listed by the provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAccount {
    /// Resource name, `billingAccounts/XXXXXX-XXXXXX-XXXXXX`.
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub open: bool,
}

impl BillingAccount {
    /// The bare account id without the `billingAccounts/` resource prefix.
    pub fn id(&self) -> &str {
        self.name
            .strip_prefix("billingAccounts/")
            .unwrap_or(&self.name)
    }
}

/// Project-creation quota for the current scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Limit(u32),
    /// The probe failed or the metric is not exposed; no provider clamp.
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServiceRow {
    pub config: ServiceConfig,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServiceAccountRow {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BillingProjectRow {
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuotaRow {
    /// String-encoded integer; `-1` means unlimited.
    #[serde(default)]
    pub effective_limit: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_account_id_strips_resource_prefix() {
        let account = BillingAccount {
            name: "billingAccounts/01AB23-CD45EF-67GH89".to_string(),
            display_name: "Team".to_string(),
            open: true,
        };
        assert_eq!(account.id(), "01AB23-CD45EF-67GH89");
    }

    #[test]
    fn billing_account_decodes_from_provider_payload() {
        let raw = r#"[{"name":"billingAccounts/01AB23-CD45EF-67GH89",
                       "displayName":"Team","open":true,"masterBillingAccount":""}]"#;
        let accounts: Vec<BillingAccount> = serde_json::from_str(raw).unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(accounts[0].open);
        assert_eq!(accounts[0].display_name, "Team");
    }

    #[test]
    fn service_row_decodes_nested_config() {
        let raw = r#"[{"config":{"name":"iam.googleapis.com"},"state":"ENABLED"}]"#;
        let rows: Vec<ServiceRow> = serde_json::from_str(raw).unwrap();
        assert_eq!(rows[0].config.name, "iam.googleapis.com");
    }
}
