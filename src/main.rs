use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use tenant_scope_api::app::{self, AppState};
use tenant_scope_api::config::config;
use tenant_scope_api::database::Database;
use tenant_scope_api::middleware::TenantResolver;

#[derive(Parser)]
#[command(name = "tenant-scope-api")]
#[command(about = "Multi-tenant product API")]
#[command(version)]
struct Args {
    #[arg(long, default_value = "0.0.0.0", help = "Address to bind")]
    host: String,

    #[arg(long, help = "Port to listen on (overrides API_PORT)")]
    port: Option<u16>,

    #[arg(long, help = "Do not apply database migrations at startup")]
    skip_migrations: bool,

    #[arg(long, help = "Shut down when standard input reaches end of file")]
    exit_on_stdin_eof: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    // Initialize configuration (this loads the config singleton)
    let config = config();
    init_tracing(config.api.enable_request_logging);
    tracing::info!("Starting tenant-scope-api in {:?} mode", config.environment);

    let db = Database::connect().await.context("failed to connect to database")?;
    if config.database.run_migrations && !args.skip_migrations {
        db.migrate().await.context("failed to apply migrations")?;
    }

    let resolver = TenantResolver::new(&config.tenancy.header_name)
        .with_context(|| format!("invalid tenant header name '{}'", config.tenancy.header_name))?;
    let state = AppState::new(db.clone(), &resolver);
    let router = app::router(state, resolver, config);

    let port = args.port.unwrap_or(config.api.port);
    let bind_addr = format!("{}:{}", args.host, port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(args.exit_on_stdin_eof))
        .await
        .context("server error")?;

    db.close().await;
    Ok(())
}

fn init_tracing(request_logging: bool) {
    let default_directive = if request_logging {
        "info,tower_http=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal(exit_on_stdin_eof: bool) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let stdin_closed = async {
        if !exit_on_stdin_eof {
            return std::future::pending::<()>().await;
        }
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 256];
        // Input is ignored; only end of file or a read error matters
        while let Ok(n) = stdin.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("Shutdown signal received"),
        _ = stdin_closed => tracing::info!("Standard input closed, shutting down"),
    }
}
