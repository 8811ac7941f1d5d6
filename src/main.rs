use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, error};

use provender::batch::{BatchController, BatchOptions, ProvisionRequest};
use provender::config::ProvisionConfig;
use provender::keystore::KeyStore;
use provender::naming::new_id;
use provender::provider::{CloudProvider, GcloudProvider};
use provender::retry::RetryPolicy;
use provender::sequencer::Sequencer;
use provender::signal_handler::setup_interrupt_handlers;
use provender::subprocess::SubprocessManager;

/// Batch-provision isolated cloud projects with locally stored keys
#[derive(Parser)]
#[command(name = "provender")]
#[command(about = "provender - Batch-provision cloud projects with service identities", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a batch of projects and mint a key for each
    Provision {
        /// Prefix for derived project ids
        #[arg(short, long)]
        prefix: Option<String>,

        /// Number of units to provision
        #[arg(short = 'n', long)]
        count: Option<u32>,

        /// Billing account id (defaults to the first open account)
        #[arg(short, long)]
        billing_account: Option<String>,

        /// Directory receiving minted keys
        #[arg(short, long)]
        key_dir: Option<PathBuf>,

        /// Path to a TOML configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Show the plan without calling the provider
        #[arg(long)]
        dry_run: bool,
    },
    /// List billing accounts visible to the current credentials
    Billing {
        /// Include closed accounts
        #[arg(long)]
        all: bool,
    },
    /// Verify the provider CLI is installed and callable
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    debug!("provender started with verbosity level: {}", cli.verbose);

    let result = match cli.command {
        Commands::Provision {
            prefix,
            count,
            billing_account,
            key_dir,
            config,
            dry_run,
        } => run_provision(prefix, count, billing_account, key_dir, config, dry_run).await,
        Commands::Billing { all } => run_billing(all).await,
        Commands::Check => run_check().await,
    };

    if let Err(e) = result {
        error!("fatal: {e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run_provision(
    prefix: Option<String>,
    count: Option<u32>,
    billing_account: Option<String>,
    key_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let mut config = ProvisionConfig::load(config_path.as_deref())
        .context("failed to load configuration")?;
    if let Some(prefix) = prefix {
        config.name_prefix = prefix;
    }
    if let Some(count) = count {
        config.count = count;
    }
    if let Some(account) = billing_account {
        config.billing_account = Some(account);
    }
    if let Some(dir) = key_dir {
        config.key_dir = dir;
    }
    config.validate()?;

    let provider: Arc<dyn CloudProvider> = Arc::new(
        GcloudProvider::new(SubprocessManager::production().runner())
            .with_bin(&config.provider_bin),
    );

    // Environment checks happen once, here, before any controller exists.
    provider.check_available().await?;
    let account = resolve_billing_account(provider.as_ref(), &config).await?;

    if dry_run {
        println!(
            "Would provision {} unit(s) under billing account {}",
            config.count, account
        );
        println!("  example id: {}", new_id(&config.name_prefix));
        println!("  services:   {}", config.services.join(", "));
        println!("  roles:      {}", config.roles.join(", "));
        println!("  key dir:    {}", config.key_dir.display());
        return Ok(());
    }

    let keystore = Arc::new(KeyStore::open(&config.key_dir)?);
    let sequencer = Sequencer::new(
        Arc::clone(&provider),
        Arc::clone(&keystore),
        RetryPolicy {
            max_attempts: config.max_attempts,
            base_delay: config.retry_base_delay,
        },
        config.services.clone(),
        config.roles.clone(),
        config.identity_name.clone(),
        config.identity_display_name.clone(),
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    setup_interrupt_handlers(Arc::clone(&interrupted))?;

    let controller = BatchController::new(
        Arc::clone(&provider),
        sequencer,
        BatchOptions {
            account_ceiling: config.account_ceiling,
            iteration_pause: config.iteration_pause,
            quota_project: config.quota_project.clone(),
        },
        interrupted,
    );

    let request = ProvisionRequest {
        name_prefix: config.name_prefix.clone(),
        count: config.count,
        billing_account: account,
    };
    let summary = controller.run(&request).await?;

    println!(
        "Provisioned {}/{} unit(s){}",
        summary.succeeded,
        summary.total(),
        if summary.failed > 0 {
            format!(" ({} failed)", summary.failed)
        } else {
            String::new()
        }
    );
    println!("Keys stored in {}", keystore.dir().display());
    Ok(())
}

async fn resolve_billing_account(
    provider: &dyn CloudProvider,
    config: &ProvisionConfig,
) -> anyhow::Result<String> {
    if let Some(account) = &config.billing_account {
        return Ok(account.clone());
    }
    let accounts = provider.list_billing_accounts(true).await?;
    let first = accounts
        .first()
        .ok_or(provender::error::Error::NoBillingAccount)?;
    tracing::info!(
        "no billing account configured, using {} ({})",
        first.id(),
        first.display_name
    );
    Ok(first.id().to_string())
}

async fn run_billing(all: bool) -> anyhow::Result<()> {
    let provider = GcloudProvider::new(SubprocessManager::production().runner());
    let accounts = provider.list_billing_accounts(!all).await?;

    if accounts.is_empty() {
        println!("No billing accounts found.");
        return Ok(());
    }
    for account in accounts {
        println!(
            "{}  {}  {}",
            account.id(),
            if account.open { "open" } else { "closed" },
            account.display_name
        );
    }
    Ok(())
}

async fn run_check() -> anyhow::Result<()> {
    let provider = GcloudProvider::new(SubprocessManager::production().runner());
    provider.check_available().await?;
    println!("Provider CLI is installed and callable.");
    Ok(())
}
