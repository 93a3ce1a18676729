use std::sync::Arc;

use http::StatusCode;
use tracing::info;

use tokio_sentry::config::{Config, TelemetryConfig};
use tokio_sentry::core::{Error, Request, ResponseWriter};
use tokio_sentry::observability::Metrics;
use tokio_sentry::telemetry::{LogClient, Scope, TelemetryClient};
use tokio_sentry::{logging, Server, Telemetry, VERSION};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env()?;
    logging::init(&config.logging)?;

    info!("Starting tokio_sentry {}...", VERSION);
    config.log_summary();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let metrics = Arc::new(Metrics::new()?);

    #[cfg(feature = "sentry")]
    let sentry = init_sentry(&config.telemetry)?;

    #[cfg(feature = "sentry")]
    let client: Arc<dyn TelemetryClient> = match sentry {
        Some((ref client, _)) => Arc::clone(client),
        None => log_client(&config.telemetry),
    };

    #[cfg(not(feature = "sentry"))]
    let client = log_client(&config.telemetry);

    let telemetry = Telemetry::from_config(client, &config.telemetry).with_metrics(Arc::clone(&metrics));

    let handler_metrics = Arc::clone(&metrics);
    let handler = telemetry.wrap(move |req: Request, res: ResponseWriter| {
        demo(req, res, Arc::clone(&handler_metrics))
    });

    let server = Server::new(config.server.clone(), handler);

    #[cfg(feature = "sentry")]
    let server = if sentry.is_some() {
        use tokio_sentry::telemetry::sentry::SentryTransaction;
        server.with_transactions(|req| {
            Box::new(SentryTransaction::start(format!("{} {}", req.method(), req.path())))
        })
    } else {
        server
    };

    #[cfg(all(feature = "otel", not(feature = "sentry")))]
    let server = server.with_transactions(|req| {
        Box::new(tokio_sentry::telemetry::otel::start_http_transaction(req))
    });

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Shutting down...");
    Ok(())
}

fn log_client(config: &TelemetryConfig) -> Arc<dyn TelemetryClient> {
    let mut scope = Scope::new();
    for (key, value) in config.tags() {
        scope.set_tag(key, value);
    }
    Arc::new(LogClient::new(scope))
}

/// Bind a Sentry client to the main hub when a DSN is configured.
///
/// The returned guard flushes the transport when dropped.
#[cfg(feature = "sentry")]
fn init_sentry(
    config: &TelemetryConfig,
) -> Result<
    Option<(Arc<dyn TelemetryClient>, sentry::ClientInitGuard)>,
    Box<dyn std::error::Error + Send + Sync>,
> {
    use tokio_sentry::telemetry::sentry::SentryClient;

    let Some(ref dsn) = config.dsn else {
        return Ok(None);
    };
    let dsn: sentry::types::Dsn = dsn.parse()?;

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: Some(config.release.clone().into()),
            environment: config.environment.clone().map(Into::into),
            send_default_pii: config.send_default_pii,
            traces_sample_rate: 1.0,
            ..Default::default()
        },
    ));

    let client: Arc<dyn TelemetryClient> = Arc::new(SentryClient::new(sentry::Hub::main()));
    Ok(Some((client, guard)))
}

async fn demo(req: Request, mut res: ResponseWriter, metrics: Arc<Metrics>) -> Result<(), Error> {
    match req.path() {
        "/" => {
            res.set_header("content-type", "text/plain; charset=utf-8");
            res.end("ok").await
        }
        "/metrics" => {
            res.set_header("content-type", "text/plain; version=0.0.4");
            res.end(metrics.export()).await
        }
        "/fail" => Err(Error::Custom(format!("demo failure on {}", req.path()))),
        _ => {
            res.set_status(StatusCode::NOT_FOUND);
            res.end("not found").await
        }
    }
}
