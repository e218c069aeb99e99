use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uniapi_common::{GlobalConfig, GlobalConfigPatch};
use uniapi_config::{ConfigProvider, ConfigStore, MemoryConfigProvider, load_seed};
use uniapi_core::{
    AuthGate, AuthKeys, Core, Forwarder, ModelResolver, SeededRandom, SelectionStrategy,
    UniformRandom, UpstreamClientConfig, WreqUpstreamClient,
};

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("uniapi failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = merge_config(&cli)?;
    info!(
        host = %config.host,
        port = config.port,
        admin_key_set = config.admin_key.is_some(),
        api_keys = config.api_keys.len(),
        timeout_secs = config.timeout_secs,
        proxy = %config.proxy.as_deref().unwrap_or(""),
        seed_file = %config.seed_file.as_deref().unwrap_or(""),
        "config loaded"
    );
    if config.admin_key.is_none() && config.api_keys.is_empty() {
        warn!("no admin key or api keys configured; every request will be rejected");
    }

    let provider = Arc::new(MemoryConfigProvider::new());
    if let Some(path) = config.seed_file.as_deref() {
        let snapshot = load_seed(path)
            .await
            .with_context(|| format!("load seed file {path}"))?;
        info!(
            configs = snapshot.configs.len(),
            mappings = snapshot.mappings.len(),
            "seed loaded"
        );
        provider.replace_snapshot(snapshot);
    }
    let configs: Arc<dyn ConfigProvider> = provider.clone();
    let store: Arc<dyn ConfigStore> = provider;

    let strategy: Arc<dyn SelectionStrategy> = match cli.selection_seed {
        Some(seed) => Arc::new(SeededRandom::new(seed)),
        None => Arc::new(UniformRandom),
    };
    let resolver = ModelResolver::new(strategy);

    let client = WreqUpstreamClient::new(UpstreamClientConfig::from_global(&config))
        .context("build upstream client")?;
    let forwarder = Forwarder::new(Arc::new(client), config.timeout());
    let auth = Arc::new(AuthGate::new(AuthKeys::new(
        config.admin_key.clone(),
        config.api_keys.clone(),
    )));

    let core = Core::new(configs, resolver.clone(), forwarder, auth.clone());
    let app = axum::Router::new()
        .merge(core.router())
        .merge(uniapi_admin::router(store, resolver, auth))
        .layer(CorsLayer::permissive());

    let bind = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(addr = %bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    info!("shut down");
    Ok(())
}

/// defaults < ENV < CLI
fn merge_config(cli: &Cli) -> anyhow::Result<GlobalConfig> {
    let mut merged = GlobalConfigPatch::from_env_vars(utf8_env(std::env::vars_os()))?;
    merged.overlay(cli.patch());
    Ok(merged.into_config()?)
}

/// Drops entries whose name or value is not UTF-8; none of the settings can use them.
fn utf8_env(
    vars: impl IntoIterator<Item = (OsString, OsString)>,
) -> impl Iterator<Item = (String, String)> {
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("uniapi=info,uniapi_core=info,uniapi_admin=info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
