//! Startup path for the chat relay server.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::conversation::store::ConversationStore;
use crate::llm::backend::GenerationBackend;
use crate::llm::gemini::GeminiClient;
use crate::server::{self, AppState};
use crate::settings::Settings;

/// Run the server until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded environment file"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(?err, "Failed to load environment file"),
    }

    info!("Starting chat relay v{}", env!("CARGO_PKG_VERSION"));

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid settings: {e}");
            return ExitCode::from(1);
        }
    };

    // The blocking HTTP client must be created and dropped outside the runtime.
    let backend: Arc<dyn GenerationBackend> = match GeminiClient::new(settings.gemini.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create generation backend: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(serve(settings, Arc::clone(&backend)));
    drop(rt);
    drop(backend);

    if let Err(e) = result {
        error!("Server error: {e}");
        return ExitCode::from(1);
    }

    info!("Chat relay stopped");
    ExitCode::SUCCESS
}

async fn serve(
    settings: Settings,
    backend: Arc<dyn GenerationBackend>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = ConversationStore::spawn(settings.store.clone())?;
    let state = AppState::new(Arc::clone(&store), backend);

    let served = server::run_server_with_shutdown(state, &settings, shutdown_signal()).await;

    store.shutdown().await;
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "Failed to listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
