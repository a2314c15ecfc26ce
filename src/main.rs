use std::sync::Arc;

use clap::Parser;
use shelfd::app;
use shelfd::config::{Cli, Config, default_config_dir, default_config_path};
use shelfd::db::Database;
use tokio::signal;
use tracing;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // Determine config path and data directory
    // If --config is provided, use its parent directory for data (database, etc.)
    // Otherwise use ~/.shelfd/ for both
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => {
            let dir = default_config_dir();
            (default_config_path(), dir)
        }
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt().json().init();
    tracing::info!("shelfd.svc starting");

    dotenvy::dotenv().ok();

    let cfg = Config::new(config_path.to_str().unwrap()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));

    if args.seed_demo {
        if let Err(e) = db.reset_demo_data().await {
            tracing::error!(error = %e, "failed to seed demo catalogue");
            std::process::exit(1);
        }
        tracing::info!("demo catalogue seeded");
    }

    let address = format!("0.0.0.0:{}", cfg.app.get_port());

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("shelfd.svc running on {}", &address);
    tokio::select! {
        result = axum::serve(listener, app(db)) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server exited with error");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("ctrl+c signal received, preparing to shutdown");
        }
    }

    tracing::info!("shelfd.svc going off, graceful shutdown complete");
}
