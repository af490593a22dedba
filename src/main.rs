use std::sync::Arc;

use weft::config::Config;
use weft::http::connection::{Engine, Handler};
use weft::http::exchange::Exchange;
use weft::server;

/// Answers every request with a short greeting.
struct Hello;

impl Handler for Hello {
    async fn handle(&self, ex: &mut Exchange<'_>) -> anyhow::Result<()> {
        ex.response_mut().set_content_type("text/plain");
        ex.write(b"Hello from weft\n").await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load();
    let engine = Arc::new(Engine::new(&cfg, Hello));

    let serve = server::listener::run(&cfg, engine.clone());
    tokio::pin!(serve);

    tokio::select! {
        res = &mut serve => return res,

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            engine.shutdown();
        }
    }

    // in-flight exchanges finish before the process exits
    serve.await
}
