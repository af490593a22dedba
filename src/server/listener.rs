use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tracing::info;

use crate::config::Config;
use crate::http::connection::{Connection, Engine, Handler};

/// Binds `cfg.listen_addr` and serves until [`Engine::shutdown`] is called.
pub async fn run<H: Handler>(cfg: &Config, engine: Arc<Engine<H>>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("Listening on {}", cfg.listen_addr);
    serve(listener, engine).await
}

/// Accepts connections from an already bound listener, one task each.
///
/// After [`Engine::shutdown`] no new connections are accepted and the call
/// returns once every connection task has finished.
pub async fn serve<H: Handler>(listener: TcpListener, engine: Arc<Engine<H>>) -> anyhow::Result<()> {
    let mut shutdown = engine.subscribe_shutdown();
    let mut tasks = JoinSet::new();

    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                reap(done);
                continue;
            }
            _ = shutdown.wait_for(|stop| *stop) => break,
        };
        tracing::debug!("Accepted connection from {}", peer);

        if let Err(e) = socket.set_nodelay(true) {
            tracing::trace!(error = %e, "Could not set TCP_NODELAY");
        }

        let engine = engine.clone();
        tasks.spawn(async move {
            let conn = Connection::new(socket, false, engine);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {:#}", peer, e);
            }
        });
    }

    drop(listener);
    info!(connections = tasks.len(), "Listener stopped, draining connections");
    while let Some(done) = tasks.join_next().await {
        reap(done);
    }
    info!("All connections closed");
    Ok(())
}

fn reap(done: Result<(), JoinError>) {
    if let Err(e) = done {
        if e.is_panic() {
            tracing::error!("Connection task panicked: {}", e);
        }
    }
}
