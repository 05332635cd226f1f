// Initialization utilities for the HTTP surface: tracing setup and the
// LabelProvider map built from configured vendor credentials.

use icvsb_client::LogMirror;
use icvsb_config::{LogFormat, RuntimeConfig};
use icvsb_core::types::Service;
use icvsb_provider::amazon::AmazonProvider;
use icvsb_provider::azure::AzureProvider;
use icvsb_provider::google::GoogleProvider;
use icvsb_provider::scripted::ScriptedProvider;
use icvsb_provider::LabelProvider;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the global `tracing` subscriber: an `EnvFilter` seeded from
/// `config.logging.level`, a text or JSON formatting layer per
/// `config.logging.format`, and the [`LogMirror`] layer so every event
/// carrying a `brc_id` field is also copied into that BRC's own log
/// (spec §2.8, §6.2 `GET /benchmark/:id/log`).
///
/// `ICVSB_LOGGER_FILE` (spec §6.3) redirects the formatted layer to a file
/// sink via a non-blocking appender; the returned guard must be leaked
/// (not dropped) for the life of the process or buffered lines are lost.
pub fn init_tracing(config: &RuntimeConfig, log_mirror: LogMirror) {
    let env_filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter).with(log_mirror);

    let file_writer = config.logging.file.as_deref().map(|path| {
        let path = Path::new(path);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "icvsb.log".to_string());
        tracing_appender::rolling::never(dir, filename)
    });

    // `ICVSB_DATABASE_LOG_FILE` (spec §6.3): sqlx instruments every query
    // under the `sqlx::query` target, so a dedicated filtered file layer
    // gives the store its own log without touching the app-wide sink.
    let db_layer = config.database.log_file.as_deref().map(|path| {
        let path = Path::new(path);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "store.log".to_string());
        let (non_blocking, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, filename));
        std::mem::forget(guard);
        fmt::layer()
            .with_writer(non_blocking)
            .with_filter(tracing_subscriber::filter::Targets::new().with_target("sqlx", tracing::Level::DEBUG))
    });
    let registry = registry.with(db_layer);

    match (file_writer, config.logging.format) {
        (Some(writer), LogFormat::Json) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(writer);
            std::mem::forget(guard);
            registry.with(fmt::layer().json().with_writer(non_blocking)).init();
        }
        (Some(writer), LogFormat::Text) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(writer);
            std::mem::forget(guard);
            registry.with(fmt::layer().with_writer(non_blocking)).init();
        }
        (None, LogFormat::Json) => {
            registry.with(fmt::layer().json()).init();
        }
        (None, LogFormat::Text) => {
            registry.with(fmt::layer()).init();
        }
    }
}

/// Builds the `{Service -> LabelProvider}` map (spec §4.1, §6.1) from
/// configured vendor credentials, falling back to the deterministic
/// [`ScriptedProvider`] for any service missing credentials so the server
/// still runs end-to-end without live vendor access (tests, local dev).
pub fn init_providers(config: &RuntimeConfig) -> HashMap<Service, Arc<dyn LabelProvider>> {
    let mut providers: HashMap<Service, Arc<dyn LabelProvider>> = HashMap::new();

    let google: Arc<dyn LabelProvider> = match (&config.vendors.google_endpoint, &config.vendors.google_api_key) {
        (Some(endpoint), Some(api_key)) => Arc::new(GoogleProvider::new(endpoint.clone(), api_key.clone())),
        _ => {
            tracing::info!("no Google Vision credentials configured, using scripted provider");
            Arc::new(ScriptedProvider::new())
        }
    };
    providers.insert(Service::Google, google);

    let amazon: Arc<dyn LabelProvider> = match (
        &config.vendors.amazon_endpoint,
        &config.vendors.amazon_access_key,
        &config.vendors.amazon_secret_key,
    ) {
        (Some(endpoint), Some(access), Some(secret)) => {
            Arc::new(AmazonProvider::new(endpoint.clone(), access.clone(), secret.clone()))
        }
        _ => {
            tracing::info!("no Amazon Rekognition credentials configured, using scripted provider");
            Arc::new(ScriptedProvider::new())
        }
    };
    providers.insert(Service::Amazon, amazon);

    let azure: Arc<dyn LabelProvider> = match (&config.vendors.azure_endpoint, &config.vendors.azure_subscription_key) {
        (Some(endpoint), Some(key)) => Arc::new(AzureProvider::new(endpoint.clone(), key.clone())),
        _ => {
            tracing::info!("no Azure Vision subscription key configured (AZURE_SUBSCRIPTION_KEY), using scripted provider");
            Arc::new(ScriptedProvider::new())
        }
    };
    providers.insert(Service::Azure, azure);

    providers
}
