use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use hoard::auth::bootstrap_admin;
use hoard::web::WebServer;
use hoard::{Config, Database};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = hoard::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        hoard::logging::init_console_only(&config.logging.level);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> hoard::Result<()> {
    config.validate()?;

    info!("Hoard - self-hosted file storage");
    info!(
        "Server configured on {}:{}",
        config.server.host, config.server.port
    );

    let db = Arc::new(Database::open(&config.database.path).await?);
    bootstrap_admin(&db, &config.auth.admin_username, &config.auth.admin_password).await?;

    let server = WebServer::new(&config, db)?;
    tokio::fs::create_dir_all(server.state().layout.staging_dir()).await?;

    // Sessions abandoned while the server was down.
    if let Err(e) = server.collect_garbage().await {
        warn!(error = %e, "Startup garbage collection failed");
    }

    server.run().await?;
    Ok(())
}
