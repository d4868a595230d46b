//! fundbridge service entry point.
//!
//! Startup order matters:
//!
//! ```text
//! ┌────────┐   ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌─────────┐
//! │ Config │──▶│ KeyCache │──▶│ Bootstrap │──▶│ Workers │──▶│ Gateway │
//! │ (YAML) │   │ (fatal)  │   │ (leader)  │   │ + Jobs  │   │ (serve) │
//! └────────┘   └──────────┘   └───────────┘   └─────────┘   └─────────┘
//! ```
//!
//! No verifier without keys, no traffic without a confirmed webhook
//! registration, no gateway without consumer workers behind it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use fundbridge::config::AppConfig;
use fundbridge::dispatch::TransferDispatcher;
use fundbridge::gateway::{self, AppState};
use fundbridge::intake::WebhookIntake;
use fundbridge::jobs::{InvoiceSeedJob, ReconciliationJob, SamplePeople};
use fundbridge::provider::types::DestinationAccount;
use fundbridge::provider::{HttpProviderClient, KeyCache, ProviderClient, SignatureVerifier};
use fundbridge::queue::{
    ConsumerConfig, InMemoryBroker, MessageBroker, QueueWorkSender, RetryConsumer, WorkSender,
};
use fundbridge::store::{DistributedLock, InMemoryStore, KeyValueStore, ReplayGuard};
use fundbridge::{bootstrap, logging};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn payout_account(config: &AppConfig) -> anyhow::Result<DestinationAccount> {
    DestinationAccount::validate_account_number(&config.payout.account)
        .context("payout account number")?;
    Ok(DestinationAccount {
        bank_code: config.payout.bank_code.clone(),
        branch: config.payout.branch.clone(),
        account: config.payout.account.clone(),
        name: config.payout.name.clone(),
        tax_id: config.payout.tax_id.clone(),
        account_type: config
            .payout
            .account_type
            .parse()
            .context("payout account type")?,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env);
    let _log_guard = logging::init_logging(&app_config);

    tracing::info!("Starting fundbridge in {} mode", env);

    // Ports: the store and broker adapters are in-process here; everything
    // downstream depends only on the traits.
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let broker: Arc<dyn MessageBroker> = Arc::new(InMemoryBroker::new());
    let provider: Arc<dyn ProviderClient> =
        Arc::new(HttpProviderClient::new(&app_config.provider.base_url));

    // No verifier exists without keys.
    let keys = Arc::new(
        KeyCache::fetch(&app_config.provider.base_url)
            .await
            .context("fetching provider signing keys")?,
    );
    println!("🔑 Loaded {} provider signing keys", keys.len());

    // Exactly one cold-starting replica registers the webhook.
    let webhook_id = bootstrap::ensure_webhook_registered(
        store.clone(),
        provider.as_ref(),
        &app_config.provider.webhook_url,
    )
    .await
    .context("webhook registration")?;
    println!("📮 Using provider webhook {}", webhook_id);

    // Queue consumer: bounded startup connect is fatal on exhaustion.
    let consumer_config = ConsumerConfig::from_queue_config(&app_config.queue);
    let consumer = Arc::new(RetryConsumer::new(
        broker.clone(),
        provider.clone(),
        consumer_config.clone(),
    ));
    consumer.connect().await.context("broker connection")?;
    let _workers = consumer.spawn_workers();
    println!(
        "⚙️  {} consumer workers on queue '{}'",
        consumer_config.workers, consumer_config.queue
    );

    let sender: Arc<dyn WorkSender> = Arc::new(QueueWorkSender::new(
        broker.clone(),
        app_config.queue.name.clone(),
    ));
    let dispatcher = Arc::new(TransferDispatcher::new(
        sender.clone(),
        payout_account(&app_config)?,
    ));
    let replay = ReplayGuard::new(store.clone());
    let lock = DistributedLock::new(store.clone());

    // Background schedules.
    let reconcile = Arc::new(ReconciliationJob::new(
        provider.clone(),
        lock.clone(),
        replay.clone(),
        dispatcher.clone(),
    ));
    let reconcile_every = Duration::from_secs(app_config.jobs.reconcile_interval_secs);
    tokio::spawn(async move { reconcile.run(reconcile_every).await });

    if app_config.jobs.invoice_seed.enabled {
        let seed = Arc::new(InvoiceSeedJob::new(
            lock.clone(),
            sender.clone(),
            Arc::new(SamplePeople),
            app_config.jobs.invoice_seed.clone(),
        ));
        let seed_every = Duration::from_secs(app_config.jobs.invoice_seed.interval_secs);
        tokio::spawn(async move { seed.run(seed_every).await });
        println!("🧾 Invoice seed job enabled");
    }

    // Webhook intake + gateway; serves until the process dies.
    let intake = Arc::new(WebhookIntake::new(
        SignatureVerifier::new(keys),
        replay,
        dispatcher,
        app_config.provider.workspace_id.clone(),
    ));
    let state = Arc::new(AppState::new(intake));
    let port = get_port_override().unwrap_or(app_config.gateway.port);
    gateway::run_server(&app_config.gateway.host, port, state).await;

    Ok(())
}
