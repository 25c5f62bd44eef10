use std::future::Future;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use grimoire_sync::LiveSync;

use crate::config::ServerConfig;
use crate::error::{io_err, ServerError};
use crate::routes::{build_router, AppState};

/// Start the server and block the current thread until it exits.
pub fn start_blocking(config: ServerConfig) -> Result<(), ServerError> {
    init_tracing(&config);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio runtime", e))?;
    runtime.block_on(run(config))
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| io_err(format!("bind {addr}"), e))?;
    serve(listener, config, ctrl_c()).await
}

/// Resolves on the first Ctrl-C. If the handler cannot be installed the
/// future never resolves and the server runs until killed.
pub async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received ctrl-c, shutting down"),
        Err(err) => {
            tracing::error!(error = %err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    }
}

/// Serve on `listener` until `trigger` resolves or the server fails.
///
/// On shutdown the subscription hub is closed first so open event streams
/// finish, then in-flight requests drain.
pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    trigger: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    if config.uses_default_secret() {
        tracing::warn!("GRIMOIRE_SECRET is not set, using the default push secret");
    }

    let sync = LiveSync::new(&config.secret, config.queue_capacity);
    let app = build_router(AppState::new(sync.clone(), config.max_wait)?);
    let local = listener
        .local_addr()
        .map_err(|e| io_err("listener address", e))?;
    tracing::info!(addr = %local, "grimoireplot server listening");

    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => {}
                _ = trigger => {
                    let _ = shutdown.send(());
                }
            }
            Ok::<(), ServerError>(())
        })
    };

    let server_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        let sync = sync.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                    sync.shutdown();
                })
                .await
                .map_err(|e| io_err("http server", e));
            let _ = shutdown.send(());
            result
        })
    };

    let (server_result, signal_result) = tokio::join!(server_handle, signal_handle);
    handle_join("http_server", server_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("server stopped");
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), ServerError>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(ServerError::Task(format!("{task} task join failure: {err}"))),
    }
}

fn init_tracing(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if config.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
