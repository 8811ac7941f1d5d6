//! # Provender
//!
//! Batch-provision isolated cloud projects through the provider CLI: each
//! unit gets a fresh project, linked billing, a fixed set of enabled
//! services, a service identity with bound roles, and a credential key
//! stored locally under owner-only permissions.
//!
//! ## Usage
//!
//! ```bash
//! provender provision --prefix v6 -n 5 [--billing-account ID] [--key-dir DIR]
//! ```
//!
//! ## Modules
//!
//! - `batch` - Batch controller: quota accounting and sequential iteration
//! - `config` - Run configuration with TOML file and CLI overrides
//! - `keystore` - Local key persistence with lock-guarded manifest appends
//! - `naming` - Project-id derivation under provider naming constraints
//! - `provider` - Cloud provider capability and the `gcloud` adapter
//! - `retry` - Bounded linear-backoff retry executor
//! - `sequencer` - Per-unit step chain with rollback on failure
//! - `signal_handler` - Interrupt flag for graceful batch abort
//! - `subprocess` - Unified subprocess abstraction layer for testing
pub mod batch;
pub mod config;
pub mod error;
pub mod keystore;
pub mod naming;
pub mod provider;
pub mod retry;
pub mod sequencer;
pub mod signal_handler;
pub mod subprocess;

pub mod testing;
