//! Application startup: pool, migrations, listener.

use crate::config::Config;
use crate::services::Database;
use crate::{build_router, AppState};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use tokio::net::TcpListener;

pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application: connect, migrate, bind. Port 0 binds a random
    /// free port, which the integration tests rely on.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;

        db.run_migrations().await?;

        let addr = config.server.bind_addr()?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "settlement-service listening");

        Ok(Self {
            port,
            listener,
            state: AppState { db, config },
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        axum::serve(self.listener, router).await
    }
}
