// # extdnsd - DNS reconciliation daemon
//
// Thin integration layer: all reconciliation logic lives in extdns-core.
//
// The daemon is responsible for:
// 1. Reading configuration from `EXTDNS_*` environment variables
// 2. Initializing logging and the runtime
// 3. Registering providers and sources
// 4. Running the controller, or serving the provider over the webhook
//    protocol when `EXTDNS_WEBHOOK_SERVER=true`
//
// ## Configuration
//
// ### Provider
// - `EXTDNS_PROVIDER`: `webhook` (default), `inmemory`
// - `EXTDNS_WEBHOOK_URL`: Webhook server URL (default `http://localhost:8888`)
// - `EXTDNS_WEBHOOK_READ_TIMEOUT`, `EXTDNS_WEBHOOK_WRITE_TIMEOUT`: Seconds
// - `EXTDNS_INMEMORY_ZONES`: Comma-separated zones for the in-memory provider
//
// ### Sources
// - `EXTDNS_SOURCE_URLS`: Comma-separated endpoint feed URLs
// - `EXTDNS_SOURCE_INTERVAL`: Feed poll interval in seconds
//
// ### Registry
// - `EXTDNS_REGISTRY`: `txt` (default), `noop`
// - `EXTDNS_TXT_OWNER_ID`, `EXTDNS_TXT_PREFIX`, `EXTDNS_TXT_SUFFIX`,
//   `EXTDNS_TXT_WILDCARD_REPLACEMENT`, `EXTDNS_TXT_NEW_FORMAT_ONLY`,
//   `EXTDNS_TXT_CACHE_INTERVAL`
//
// ### Scope
// - `EXTDNS_DOMAIN_FILTER`, `EXTDNS_EXCLUDE_DOMAINS`, `EXTDNS_ZONE_ID_FILTER`
// - `EXTDNS_REGEX_DOMAIN_FILTER`, `EXTDNS_REGEX_DOMAIN_EXCLUSION`: Override
//   the suffix lists when set
//
// ### Controller
// - `EXTDNS_INTERVAL`, `EXTDNS_MIN_EVENT_SYNC_INTERVAL`, `EXTDNS_CYCLE_TIMEOUT`
// - `EXTDNS_ONCE`, `EXTDNS_DRY_RUN`, `EXTDNS_EVENTS`, `EXTDNS_FAIL_ON_SOURCE_ERROR`
// - `EXTDNS_POLICY`: `sync`, `upsert-only`, `create-only`
// - `EXTDNS_TIE_BREAK`: `lowest-resource`, `highest-resource`
// - `EXTDNS_MANAGED_RECORD_TYPES`: Comma-separated record types
//
// ### Daemon
// - `EXTDNS_LOG_LEVEL`: `trace`..`error` (default `info`)
// - `EXTDNS_LOG_FORMAT`: `text` (default), `json`
// - `EXTDNS_WEBHOOK_SERVER`, `EXTDNS_WEBHOOK_SERVER_ADDR`
//
// ## Example
//
// ```bash
// export EXTDNS_WEBHOOK_URL=http://localhost:8888
// export EXTDNS_SOURCE_URLS=http://feed.local/endpoints
// export EXTDNS_DOMAIN_FILTER=example.com
// export EXTDNS_TXT_OWNER_ID=cluster-a
//
// extdnsd
// ```

mod settings;

use anyhow::Result;
use extdns_core::{Controller, ControllerEvent, Factories};
use settings::{LogFormat, Settings};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy)]
enum ExtDnsExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<ExtDnsExitCode> for ExitCode {
    fn from(code: ExtDnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExtDnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return ExtDnsExitCode::ConfigError.into();
    }

    if let Err(e) = init_tracing(&settings) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ExtDnsExitCode::ConfigError.into();
    }

    info!("Starting extdnsd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ExtDnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(settings).await {
            Ok(()) => ExtDnsExitCode::CleanShutdown,
            Err(e) if is_config_error(&e) => {
                error!("Startup failed: {:#}", e);
                ExtDnsExitCode::ConfigError
            }
            Err(e) => {
                error!("Daemon error: {:#}", e);
                ExtDnsExitCode::RuntimeError
            }
        }
    })
    .into()
}

fn init_tracing(settings: &Settings) -> Result<()> {
    let filter = EnvFilter::try_new(settings.log_level.to_lowercase())?;
    let builder = FmtSubscriber::builder().with_env_filter(filter);
    match settings.log_format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

fn is_config_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<extdns_core::Error>()
        .is_some_and(extdns_core::Error::is_config)
}

fn factories() -> Factories {
    #[allow(unused_mut)]
    let mut factories = Factories::with_builtin();

    #[cfg(feature = "webhook")]
    extdns_provider_webhook::register(&mut factories);

    #[cfg(feature = "http")]
    extdns_source_http::register(&mut factories);

    debug!(
        "Registered providers {:?}, sources {:?}",
        factories.list_providers(),
        factories.list_sources()
    );
    factories
}

async fn run_daemon(settings: Settings) -> Result<()> {
    let factories = factories();
    let shutdown = CancellationToken::new();

    if let Some(addr) = settings.webhook_server {
        return serve_webhook(&factories, settings, addr, shutdown).await;
    }

    let config = settings.config;
    let once = config.controller.once;
    if config.controller.dry_run {
        warn!("Dry-run mode: changes will be logged, not applied");
    }

    let (controller, mut events) = Controller::build(config, &factories)?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ControllerEvent::CycleFailed { error } => warn!("Cycle failed: {}", error),
                other => debug!("Controller event: {:?}", other),
            }
        }
    });

    if !once {
        spawn_signal_handler(shutdown.clone())?;
    }

    controller.run_with_shutdown(shutdown).await?;
    info!("Shutting down daemon");
    Ok(())
}

#[cfg(feature = "webhook")]
async fn serve_webhook(
    factories: &Factories,
    settings: Settings,
    addr: std::net::SocketAddr,
    shutdown: CancellationToken,
) -> Result<()> {
    let provider: std::sync::Arc<dyn extdns_core::Provider> =
        std::sync::Arc::from(factories.create_provider(&settings.config.provider)?);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    spawn_signal_handler(shutdown.clone())?;
    extdns_provider_webhook::server::serve(listener, provider, shutdown).await?;
    info!("Webhook server stopped");
    Ok(())
}

#[cfg(not(feature = "webhook"))]
async fn serve_webhook(
    _factories: &Factories,
    _settings: Settings,
    _addr: std::net::SocketAddr,
    _shutdown: CancellationToken,
) -> Result<()> {
    Err(extdns_core::Error::config("EXTDNS_WEBHOOK_SERVER requires the webhook feature").into())
}

/// Cancel `shutdown` on the first termination signal
fn spawn_signal_handler(shutdown: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

        tokio::spawn(async move {
            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            info!("Received shutdown signal: {}", name);
            shutdown.cancel();
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal: SIGINT");
            shutdown.cancel();
        }
    });

    Ok(())
}
