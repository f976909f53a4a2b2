use actix_web::{web, App, HttpServer};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_worker::config::Config;
use feed_worker::consumers::{AmqpSubscription, ConsumerSettings, EventConsumer};
use feed_worker::grpc::GrpcFollowerResolver;
use feed_worker::handlers::{self, FeedHandlerState};
use feed_worker::jobs::store_health::{start_store_health_check, StoreHealthConfig};
use feed_worker::{FanOutHandler, FanOutSettings, RedisFeedStore};
use idempotent_consumer::RedisLedger;
use tracing::info;

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }

    info!("Shutdown signal received");
}

fn init_tracing() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},lapin=warn", log_level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting feed-worker v{}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.env);

    let store = match RedisFeedStore::new(&config.redis.url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Redis connection failed: {}", e);
            eprintln!("ERROR: Failed to connect to Redis: {}", e);
            std::process::exit(1);
        }
    };
    info!("Connected to Redis");

    let resolver =
        match GrpcFollowerResolver::new(&config.resolver.address, config.resolver.timeout()) {
            Ok(resolver) => Arc::new(resolver),
            Err(e) => {
                tracing::error!("Invalid users service address: {}", e);
                eprintln!("ERROR: Invalid USERS_GRPC_ADDRESS: {}", e);
                std::process::exit(1);
            }
        };
    info!(
        address = %config.resolver.address,
        timeout_ms = config.resolver.timeout_ms,
        "Users service client initialized"
    );

    // Delivery markers and attempt counters share the feed store's connection.
    let ledger = Arc::new(RedisLedger::new(
        store.connection_manager(),
        Duration::from_secs(config.fanout.dedup_ttl_secs),
    ));

    let mut handler = FanOutHandler::new(
        resolver,
        store.clone(),
        FanOutSettings {
            feed_max_length: config.redis.feed_max_length,
            resolver_failure_policy: config.fanout.resolver_failure_policy,
        },
    );
    if config.fanout.dedup_enabled {
        handler = handler.with_delivery_ledger(ledger.clone());
        info!(
            ttl_secs = config.fanout.dedup_ttl_secs,
            "Per-follower delivery markers enabled"
        );
    }

    let subscription = match AmqpSubscription::connect(&config.broker).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::error!("RabbitMQ connection failed: {}", e);
            eprintln!("ERROR: Failed to connect to RabbitMQ: {}", e);
            std::process::exit(1);
        }
    };
    let deliveries = match subscription.deliveries().await {
        Ok(deliveries) => deliveries,
        Err(e) => {
            tracing::error!("Failed to start consuming {}: {}", config.broker.queue, e);
            eprintln!("ERROR: Failed to start consuming: {}", e);
            std::process::exit(1);
        }
    };

    let consumer = EventConsumer::new(
        Arc::new(handler),
        ledger,
        Arc::new(subscription.dead_letter_sink()),
        ConsumerSettings {
            max_concurrent_deliveries: config.broker.max_concurrent_deliveries,
            max_delivery_attempts: config.broker.max_delivery_attempts,
        },
    );

    let health_store = store.clone();
    tokio::spawn(async move {
        start_store_health_check(health_store, StoreHealthConfig::default()).await;
    });
    info!("Feed store health check background job started");

    let feed_state = web::Data::new(FeedHandlerState { store });
    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(feed_state.clone())
            .configure(handlers::configure)
    })
    .bind(format!("0.0.0.0:{}", config.app.port))?
    .disable_signals()
    .run();
    let http_handle = http_server.handle();
    let http_task = tokio::spawn(http_server);
    info!("HTTP server listening on 0.0.0.0:{}", config.app.port);

    let consumed = consumer.run(deliveries, shutdown_signal()).await;

    http_handle.stop(true).await;
    if let Err(e) = http_task.await {
        tracing::warn!("HTTP server task failed: {}", e);
    }
    if let Err(e) = subscription.close().await {
        tracing::warn!("Failed to close RabbitMQ channel: {}", e);
    }

    if let Err(e) = consumed {
        tracing::error!("Post events consumer failed: {}", e);
        eprintln!("ERROR: Post events consumer failed: {}", e);
        std::process::exit(1);
    }

    info!("feed-worker stopped");
    Ok(())
}
