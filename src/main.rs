use std::{future::IntoFuture, process, sync::Arc};

use feedgate::{
    application::{error::AppError, probe::probe},
    cache::CacheState,
    config::{self, ProbeArgs, Settings},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
    routes,
};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Probe(args) => run_probe(args).await,
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let registry = Arc::new(routes::registry()?);
    let (cache, background) = CacheState::from_config(&settings.cache_config()).await?;
    let state = HttpState::new(Arc::clone(&registry), cache, &settings.access)?;
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "feedgate::serve",
        addr = %settings.server.addr,
        routes = registry.routes().count(),
        "listening"
    );

    let budget = settings.server.graceful_shutdown;
    let (signalled, on_signal) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled.send(());
        })
        .into_future();
    tokio::pin!(server);

    let result = tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = async {
            if on_signal.await.is_ok() {
                tokio::time::sleep(budget).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            warn!(
                target = "feedgate::serve",
                budget_secs = budget.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    };

    stop_background(background).await;
    info!(target = "feedgate::serve", "stopped");
    result
}

async fn stop_background(tasks: Vec<JoinHandle<()>>) {
    for task in &tasks {
        task.abort();
    }
    futures::future::join_all(tasks).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "feedgate::serve", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "feedgate::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(target = "feedgate::serve", "shutdown signal received");
}

async fn run_probe(args: ProbeArgs) -> Result<(), AppError> {
    let registry = routes::registry()?;
    let report = probe(&registry, &args.path, args.limit).await?;
    print!("{report}");
    Ok(())
}
