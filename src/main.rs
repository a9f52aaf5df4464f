//! Wiring & DI. Entry point: load settings, bootstrap adapters, run the reconciler.
//! No business logic here; exit codes come from `shared::exit_codes`.

use anyhow::Context;
use dotenv::dotenv;
use glueforward::adapters::gluetun::GluetunClient;
use glueforward::adapters::http;
use glueforward::adapters::qbittorrent::QBittorrentClient;
use glueforward::adapters::slskd::SlskdClient;
use glueforward::domain::ServiceKind;
use glueforward::ports::ServiceClient;
use glueforward::shared::{AppConfig, ReturnCode, Settings};
use glueforward::usecases::{ApplyPolicy, Intervals, Reconciler};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// One request in flight at a time; nothing to parallelize.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!(cwd = %cwd.display(), "no .env found (environment only)"),
    }

    let settings = match AppConfig::load().and_then(|cfg| cfg.settings()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ReturnCode::MissingConfig.into();
        }
    };
    info!(
        gluetun = %settings.gluetun_url,
        service = %settings.service,
        url = %settings.service_url,
        api_key = settings.gluetun_api_key.is_some(),
        "configuration loaded"
    );

    let mut reconciler = match build_reconciler(&settings) {
        Ok(reconciler) => reconciler,
        Err(e) => {
            error!(error = %format!("{e:#}"), "startup failed");
            return ReturnCode::Unexpected.into();
        }
    };

    let err = reconciler.run().await;
    let code = ReturnCode::for_error(&err);
    error!(error = %err, exit_code = code as u8, "exiting");
    code.into()
}

/// Build the port source and the selected service client.
fn build_reconciler(settings: &Settings) -> anyhow::Result<Reconciler> {
    let gluetun_http =
        http::build_client(settings.http_timeout).context("build gluetun HTTP client")?;
    let source = GluetunClient::new(
        gluetun_http,
        settings.gluetun_url.clone(),
        settings.gluetun_api_key.clone(),
    );

    let service_http = http::build_client(settings.http_timeout)
        .with_context(|| format!("build {} HTTP client", settings.service))?;
    let client: Box<dyn ServiceClient> = match settings.service {
        ServiceKind::Qbittorrent => Box::new(QBittorrentClient::new(
            service_http,
            settings.service_url.clone(),
            settings.credentials.clone(),
        )),
        ServiceKind::Slskd => Box::new(SlskdClient::new(
            service_http,
            settings.service_url.clone(),
            settings.credentials.clone(),
        )),
    };

    let policy = if settings.reapply_unchanged {
        ApplyPolicy::Always
    } else {
        ApplyPolicy::SkipUnchanged
    };
    let intervals = Intervals {
        success: settings.success_interval,
        retry: settings.retry_interval,
    };

    Ok(Reconciler::new(Box::new(source), client, intervals, policy))
}
