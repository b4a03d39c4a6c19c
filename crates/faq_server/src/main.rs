use anyhow::Context;
use clap::Parser;
use faq_core::FaqError;
use faq_server::{build_router, ServerArgs};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for ctrl-c");
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    // A missing .env is fine; real environment variables take precedence.
    if let Ok(path) = dotenvy::dotenv() {
        info!(path = %path.display(), "loaded environment file");
    }
    let args = ServerArgs::parse();

    let assistant = match args.build_assistant() {
        Ok(assistant) => assistant,
        Err(err) => {
            let configuration = err
                .downcast_ref::<FaqError>()
                .is_some_and(FaqError::is_startup_fatal);
            if configuration {
                error!("invalid configuration, refusing to start: {err:#}");
                std::process::exit(2);
            }
            error!("startup failed: {err:#}");
            std::process::exit(1);
        }
    };
    info!(
        faq_entries = assistant.knowledge_base().len(),
        model = assistant.knowledge_base().model_id(),
        threshold = assistant.config().threshold,
        "assistant ready"
    );

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!("listening on http://{}", args.bind);

    axum::serve(listener, build_router(assistant))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
