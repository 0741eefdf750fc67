use actix_web::{web, App, HttpServer};
use saldo::config::Config;
use saldo::core::{EventDispatcherBuilder, EventLogSubscriber, EventName, EventSubscriber};
use saldo::middleware::{ErrorLogger, RequestId};
use saldo::modules::health::controllers::health_controller;
use saldo::modules::idempotency::repositories::{IdempotencyStore, MySqlIdempotencyStore};
use saldo::modules::idempotency::services::{IdempotencyService, IdempotencySweeper};
use saldo::modules::identity::repositories::{MySqlUserDirectory, UserDirectory};
use saldo::modules::ledger::repositories::{LedgerRepository, MySqlLedgerRepository};
use saldo::modules::ledger::services::{LedgerReconciler, LedgerService};
use saldo::modules::payments::controllers::{payment_controller, webhook_controller};
use saldo::modules::payments::repositories::{MySqlTransactionRepository, TransactionRepository};
use saldo::modules::payments::services::{
    CommissionPolicy, PaymentOrchestrator, RoutingConfig, WebhookProcessor,
};
use saldo::modules::providers::{
    provider_http_client, KirimpayProvider, NusapayProvider, ProviderRegistry, QrispayProvider,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "saldo=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting Saldo Payment Orchestrator");
    tracing::info!("Environment: {}", config.app.env);
    tracing::info!("Server binding to: {}", config.server.bind_address());

    // Create database connection pool and apply migrations
    let db_pool = config.database.create_pool().await?;
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    tracing::info!(
        "Database pool initialized ({} connections)",
        config.database.pool_size
    );

    // Provider adapters share one retrying HTTP client
    let client = provider_http_client(config.payments.provider_timeout())?;
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(NusapayProvider::new(
        client.clone(),
        config.nusapay.api_key.clone(),
        config.nusapay.webhook_secret.clone(),
        config.nusapay.base_url.clone(),
    )));
    registry.register(Arc::new(QrispayProvider::new(
        client.clone(),
        config.qrispay.api_key.clone(),
        config.qrispay.webhook_secret.clone(),
        config.qrispay.base_url.clone(),
    )));
    registry.register(Arc::new(KirimpayProvider::new(
        client,
        config.kirimpay.api_key.clone(),
        config.kirimpay.webhook_secret.clone(),
        config.kirimpay.base_url.clone(),
    )));
    let providers = Arc::new(registry);
    tracing::info!(providers = ?providers.names(), "Provider registry built");

    // Persistence
    let transactions: Arc<dyn TransactionRepository> =
        Arc::new(MySqlTransactionRepository::new(db_pool.clone()));
    let ledger_store: Arc<dyn LedgerRepository> =
        Arc::new(MySqlLedgerRepository::new(db_pool.clone()));
    let ledger = Arc::new(LedgerService::new(ledger_store));
    let idempotency_store: Arc<dyn IdempotencyStore> =
        Arc::new(MySqlIdempotencyStore::new(db_pool.clone()));
    let idempotency = Arc::new(IdempotencyService::new(
        idempotency_store.clone(),
        config.payments.processing_timeout(),
        config.payments.retention(),
    ));
    let users: Arc<dyn UserDirectory> = Arc::new(MySqlUserDirectory::new(db_pool.clone()));

    // Event registry: the full event graph is fixed here, before the first
    // request. The log subscriber keeps an audit trail for every transition.
    let audit: Arc<dyn EventSubscriber> = Arc::new(EventLogSubscriber);
    let dispatcher = Arc::new(
        EventName::ALL
            .into_iter()
            .fold(EventDispatcherBuilder::new(), |builder, name| {
                builder.subscribe(name, audit.clone())
            })
            .build(),
    );

    let routing = RoutingConfig {
        card_provider: config.payments.card_provider.clone(),
        qr_provider: config.payments.qr_provider.clone(),
        payout_provider: config.payments.payout_provider.clone(),
        charge_fallback: config.payments.charge_fallback.clone(),
    };
    let commission = config.payments.commission_rate_bps.map(CommissionPolicy::new);

    let orchestrator = Arc::new(PaymentOrchestrator::new(
        transactions.clone(),
        ledger.clone(),
        providers.clone(),
        users,
        dispatcher.clone(),
        routing,
        commission,
        config.payments.platform_user_id.clone(),
    ));
    let processor = Arc::new(WebhookProcessor::new(
        providers,
        idempotency,
        transactions,
        ledger.clone(),
        dispatcher.clone(),
    ));

    // Background jobs
    let sweeper = Arc::new(IdempotencySweeper::new(
        idempotency_store,
        config.payments.processing_timeout(),
        config.payments.sweep_interval(),
    ));
    tokio::spawn(sweeper.start());

    let reconciler = Arc::new(LedgerReconciler::new(
        ledger,
        dispatcher,
        config.payments.reconcile_interval_secs,
    ));
    tokio::spawn(reconciler.start());

    // Start HTTP server
    let bind_address = config.server.bind_address();
    let workers = config.server.workers;
    let server = HttpServer::new(move || {
        App::new()
            .wrap(ErrorLogger)
            .wrap(RequestId)
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::new(orchestrator.clone()))
            .app_data(web::Data::new(processor.clone()))
            .configure(payment_controller::configure)
            .configure(webhook_controller::configure)
            .configure(health_controller::configure)
    });
    let server = match workers {
        Some(workers) => server.workers(workers),
        None => server,
    };
    let server = server.bind(&bind_address)?.run();

    tracing::info!("Server started at http://{}", bind_address);

    server.await?;
    Ok(())
}
