use std::fmt;

/// Lifecycle of one provisioning unit. Strictly linear; `Failed` and
/// `RolledBack` are reachable from any intermediate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Nothing exists at the provider yet.
    Pending,
    Created,
    BillingLinked,
    ServicesEnabled,
    IdentityReady,
    RolesBound,
    KeyMinted,
    Failed,
    RolledBack,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitState::Pending => "pending",
            UnitState::Created => "created",
            UnitState::BillingLinked => "billing-linked",
            UnitState::ServicesEnabled => "services-enabled",
            UnitState::IdentityReady => "identity-ready",
            UnitState::RolesBound => "roles-bound",
            UnitState::KeyMinted => "key-minted",
            UnitState::Failed => "failed",
            UnitState::RolledBack => "rolled-back",
        };
        f.write_str(name)
    }
}

/// One project being provisioned. Owned by a single sequencer run and never
/// shared across iterations.
#[derive(Debug, Clone)]
pub struct ProjectUnit {
    pub id: String,
    pub state: UnitState,
}

impl ProjectUnit {
    pub fn new(id: String) -> Self {
        Self {
            id,
            state: UnitState::Pending,
        }
    }

    pub fn advance(&mut self, state: UnitState) {
        tracing::debug!("unit {}: {} -> {}", self.id, self.state, state);
        self.state = state;
    }

    pub fn fail(&mut self) {
        self.advance(UnitState::Failed);
    }

    pub fn mark_rolled_back(&mut self) {
        self.advance(UnitState::RolledBack);
    }

    /// Whether anything was created at the provider for this unit.
    pub fn exists_remotely(&self) -> bool {
        !matches!(self.state, UnitState::Pending)
    }
}
