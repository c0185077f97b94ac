//! Web server for Hoard.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::db::Database;
use crate::file::{ChunkStore, StorageLayout};
use crate::upload::{SqliteSessionStore, UploadCoordinator, UploadSessionRegistry};
use crate::{HoardError, Result};

use super::handlers::AppState;
use super::middleware::{JwtState, RateLimitState};
use super::router::{create_health_router, create_router};

/// Interval between sweeps of idle login rate limiters.
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Web server for the API.
pub struct WebServer {
    addr: SocketAddr,
    app_state: Arc<AppState>,
    jwt_state: Arc<JwtState>,
    rate_limit: Arc<RateLimitState>,
    cors_origins: Vec<String>,
    gc_interval: Option<Duration>,
    session_max_age: Duration,
}

impl WebServer {
    /// Wire the storage layout, session store and coordinator from the
    /// configuration.
    pub fn new(config: &Config, db: Arc<Database>) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| HoardError::Config(format!("invalid server address: {e}")))?;

        let layout = StorageLayout::new(&config.storage.root)?;
        let store = Arc::new(SqliteSessionStore::new(db.pool().clone()));
        let registry = UploadSessionRegistry::new(store, ChunkStore::new(layout.staging_dir()));
        let coordinator = Arc::new(UploadCoordinator::new(
            registry,
            config.storage.chunk_size_bytes,
            config.storage.max_file_size_bytes,
        ));

        let app_state = AppState::new(
            db,
            coordinator,
            layout,
            &config.auth.jwt_secret,
            config.auth.access_token_expiry_secs,
        )?;

        Ok(Self {
            addr,
            app_state: Arc::new(app_state),
            jwt_state: Arc::new(JwtState::new(&config.auth.jwt_secret)),
            rate_limit: Arc::new(RateLimitState::new(config.auth.login_rate_limit)),
            cors_origins: config.server.cors_origins.clone(),
            gc_interval: (config.storage.gc_interval_secs > 0)
                .then(|| Duration::from_secs(config.storage.gc_interval_secs)),
            session_max_age: Duration::from_secs(config.storage.session_max_age_hours * 3600),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared application state.
    pub fn state(&self) -> &Arc<AppState> {
        &self.app_state
    }

    /// Reclaim expired sessions and orphaned staging directories once.
    pub async fn collect_garbage(&self) -> Result<usize> {
        self.app_state
            .coordinator
            .garbage_collect(self.session_max_age)
            .await
    }

    /// Start the periodic upload garbage collection task.
    fn start_gc_task(coordinator: Arc<UploadCoordinator>, every: Duration, max_age: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);

            // Skip the first immediate tick; startup runs its own sweep.
            interval.tick().await;

            loop {
                interval.tick().await;
                match coordinator.garbage_collect(max_age).await {
                    Ok(0) => tracing::debug!("No expired upload sessions"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Upload garbage collection failed"),
                }
            }
        });
    }

    fn start_rate_limit_cleanup_task(rate_limit: Arc<RateLimitState>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                rate_limit.cleanup();
            }
        });
    }

    async fn bind(self) -> std::io::Result<(TcpListener, axum::Router)> {
        let listener = TcpListener::bind(self.addr).await?;

        if let Some(every) = self.gc_interval {
            Self::start_gc_task(
                Arc::clone(&self.app_state.coordinator),
                every,
                self.session_max_age,
            );
            tracing::info!(interval_secs = every.as_secs(), "Upload GC task started");
        }
        Self::start_rate_limit_cleanup_task(Arc::clone(&self.rate_limit));

        let router = create_router(
            self.app_state,
            self.jwt_state,
            self.rate_limit,
            &self.cors_origins,
        )
        .merge(create_health_router());

        Ok((listener, router))
    }

    /// Run the web server.
    pub async fn run(self) -> std::io::Result<()> {
        let (listener, router) = self.bind().await?;
        tracing::info!("Web server listening on http://{}", listener.local_addr()?);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }

    /// Run the server in the background and return the bound address.
    ///
    /// Binding to port 0 picks a free port.
    pub async fn run_with_addr(self) -> std::io::Result<SocketAddr> {
        let (listener, router) = self.bind().await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_config(temp: &TempDir) -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.storage.root = temp.path().join("storage").display().to_string();
        config.auth.jwt_secret = "test-secret-key".to_string();
        config
    }

    #[tokio::test]
    async fn test_web_server_new() {
        let temp = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().await.unwrap());

        let server = WebServer::new(&test_config(&temp), db).unwrap();
        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
        assert_eq!(server.gc_interval, Some(Duration::from_secs(3600)));
        assert_eq!(server.session_max_age, Duration::from_secs(24 * 3600));
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let temp = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let mut config = test_config(&temp);
        config.server.host = "not an address".to_string();

        assert!(matches!(
            WebServer::new(&config, db),
            Err(HoardError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_gc_disabled_by_zero_interval() {
        let temp = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let mut config = test_config(&temp);
        config.storage.gc_interval_secs = 0;

        let server = WebServer::new(&config, db).unwrap();
        assert!(server.gc_interval.is_none());
        assert_eq!(server.collect_garbage().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_web_server_run() {
        let temp = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let server = WebServer::new(&test_config(&temp), db).unwrap();
        let addr = server.run_with_addr().await.unwrap();

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));
    }
}
