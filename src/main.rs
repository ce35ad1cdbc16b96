//! Solace Billing Server
//!
//! Server-authoritative balance reconciliation backend for the Solace
//! Listener marketplace: wallet reads, session settlement, and exactly-once
//! payment crediting.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use solace_api::handlers::{configure_payments, configure_sessions, configure_wallet};
use solace_auth::JwtService;
use solace_cache::RedisCache;
use solace_core::traits::{PaymentProcessor, SettlementService, WalletStore};
use solace_core::AppConfig;
use solace_db::{create_pool, run_migrations, PgEarningRepository, PgWalletRepository};
use solace_services::gateway::HttpPaymentGateway;
use solace_services::{
    PaymentCreditProcessor, PgCreditStore, PgSettlementService, RoomTokenIssuer,
};
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "solace-billing",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "solace_billing={},solace_api={},solace_services={},solace_db={},actix_web=info,sqlx=warn",
            log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    info!("Starting Solace Billing v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().expect("Failed to load configuration");
    let policy = config.billing.rate_policy();

    // Database
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .expect("Failed to create database pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // Redis (wallet snapshot fan-out)
    let cache = RedisCache::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");

    // Auth
    let jwt_service = Arc::new(JwtService::new(
        &config.auth.jwt_secret,
        config.auth.jwt_expiration_minutes * 60,
    ));
    let room_tokens = Arc::new(RoomTokenIssuer::new(
        &config.auth.jwt_secret,
        config.auth.room_token_ttl_secs,
        policy.clone(),
    ));

    // Balance store and settlement
    let wallet_store: Arc<dyn WalletStore> = Arc::new(PgWalletRepository::new(
        pool.clone(),
        policy.signup_free_messages,
    ));
    let earnings = Arc::new(PgEarningRepository::new(pool.clone()));
    let settlement: Arc<dyn SettlementService> = Arc::new(PgSettlementService::new(
        pool.clone(),
        earnings,
        cache.clone(),
        policy.clone(),
        config.redis.snapshot_ttl_secs,
    ));

    // Payment crediting
    let gateway = Arc::new(HttpPaymentGateway::new(
        &config.gateway.base_url,
        &config.gateway.key_id,
        &config.gateway.key_secret,
        &config.gateway.currency,
    ));
    let credit_store = Arc::new(PgCreditStore::new(
        pool.clone(),
        cache.clone(),
        policy.clone(),
        config.redis.snapshot_ttl_secs,
    ));
    let payments: Arc<dyn PaymentProcessor> = Arc::new(PaymentCreditProcessor::new(
        gateway,
        credit_store,
        &config.gateway.webhook_secret,
    ));

    let addr = config.server_addr();
    let workers = config.server.workers;
    info!("Listening on {} with {} workers", addr, workers);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(cors)
            .app_data(web::Data::new(jwt_service.clone()))
            .app_data(web::Data::new(wallet_store.clone()))
            .app_data(web::Data::new(settlement.clone()))
            .app_data(web::Data::new(payments.clone()))
            .app_data(web::Data::new(room_tokens.clone()))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health_check))
                    .configure(configure_wallet)
                    .configure(configure_sessions)
                    .configure(configure_payments),
            )
    })
    .workers(workers)
    .bind(&addr)?
    .run()
    .await
}
