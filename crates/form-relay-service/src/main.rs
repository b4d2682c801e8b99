//! # Form-Relay Service
//!
//! Binary entry point for the distribution engine's HTTP service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes observability (structured logging)
//! - Wires the dispatcher, adapter registry, subscription manager, and
//!   orchestrator together
//! - Starts the HTTP server from form-relay-api

mod settings;

use form_relay_api::{router, ApiState, StaticApiKeys};
use form_relay_core::adapters::{
    MemoryDeliveryLogStore, MemoryIntegrationStore, MemorySubscriptionStore, MemoryWebhookStore,
};
use form_relay_core::dispatch::Dispatcher;
use form_relay_core::orchestrator::Orchestrator;
use form_relay_core::providers::AdapterRegistry;
use form_relay_core::subscription::SubscriptionManager;
use form_relay_core::transport::ReqwestTransport;
use settings::ServiceConfig;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "form_relay_service=info,form_relay_api=info,form_relay_core=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Form-Relay Service");

    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Sources (applied in order — later sources override earlier ones):
    //  1. /etc/form-relay/service.toml    — system-wide defaults
    //  2. ./config/service.toml           — deployment-local override
    //  3. Path given by FR_CONFIG_FILE env — operator-specified file
    //  4. Environment variables prefixed FR__ (double-underscore separator)
    //     e.g. FR__SERVER__PORT=9090 sets server.port = 9090
    //
    // All fields carry serde defaults, so an entirely unconfigured
    // environment produces a valid service config. A malformed file or an
    // environment variable that cannot be coerced IS a hard error because it
    // indicates deliberate-but-broken operator configuration.
    // -------------------------------------------------------------------------
    let mut config_builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/form-relay/service")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Toml),
        );

    // Optional explicit path supplied by the operator.
    if let Ok(explicit_path) = std::env::var("FR_CONFIG_FILE") {
        if !explicit_path.is_empty() {
            config_builder = config_builder.add_source(
                config::File::with_name(&explicit_path)
                    .required(true)
                    .format(config::FileFormat::Toml),
            );
            info!(path = %explicit_path, "Loading configuration from explicit path");
        }
    }

    let config = match config_builder
        .add_source(config::Environment::with_prefix("FR").separator("__"))
        .build()
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Failed to build configuration; aborting");
            std::process::exit(3);
        }
    };

    let service_config: ServiceConfig = match config.try_deserialize() {
        Ok(sc) => sc,
        Err(e) => {
            error!(
                error = %e,
                "Could not deserialize service configuration; aborting. \
                 Fix the configuration and restart."
            );
            std::process::exit(3);
        }
    };

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    // -------------------------------------------------------------------------
    // Wire dependencies
    //
    // The in-memory stores serve development and single-node deployments; a
    // relational deployment swaps in its own implementations of the store
    // traits at this seam.
    // -------------------------------------------------------------------------
    let transport = Arc::new(ReqwestTransport::new()?);
    let log_store = Arc::new(MemoryDeliveryLogStore::new());
    let webhook_store = Arc::new(MemoryWebhookStore::new());
    let integration_store = Arc::new(MemoryIntegrationStore::new());
    let subscription_store = Arc::new(MemorySubscriptionStore::new());

    let policy = service_config.failure_policy();
    let dispatcher = Arc::new(Dispatcher::with_config(
        transport.clone(),
        log_store.clone(),
        service_config.dispatch_config(),
    ));
    let subscriptions = Arc::new(SubscriptionManager::new(
        subscription_store,
        dispatcher.clone(),
        policy,
    ));
    let registry = Arc::new(AdapterRegistry::standard(transport));
    let orchestrator = Arc::new(Orchestrator::new(
        integration_store,
        webhook_store.clone(),
        subscriptions.clone(),
        registry.clone(),
        dispatcher.clone(),
        policy,
        service_config.orchestrator_config(),
    ));

    let mut keys = StaticApiKeys::new();
    for entry in service_config.api_key_entries() {
        keys = keys.with_key(entry.0, entry.1);
    }
    if service_config.api_keys.is_empty() {
        tracing::warn!(
            "No API keys configured; every request to the service will be rejected. \
             Add [[api_keys]] entries to the configuration."
        );
    }

    let state = ApiState {
        subscriptions,
        webhooks: webhook_store,
        dispatcher,
        registry,
        orchestrator,
        keys: Arc::new(keys),
    };

    // -------------------------------------------------------------------------
    // Serve
    // -------------------------------------------------------------------------
    let address = service_config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, "Form-Relay Service listening");

    axum::serve(listener, router(state)).await?;

    Ok(())
}
