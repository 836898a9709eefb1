use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use mailroom_api::auth::{AppState, AppStateInner, hash_password};
use mailroom_db::{Database, Store};
use mailroom_dispatch::{
    BatchConfig, BatchSettings, CampaignDispatcher, CampaignService, ContactService,
    DEFAULT_BATCH_INTERVAL_SECS, DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL, DispatchScheduler,
    LogTransport, MailTransport, SmtpConfig, SmtpTransport,
};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `mailroom hash-password <password>` prints a value for MAILROOM_ADMIN_PASSWORD_HASH
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("hash-password") {
        let Some(password) = args.get(2) else {
            eprintln!("usage: mailroom hash-password <password>");
            std::process::exit(2);
        };
        println!("{}", hash_password(password)?);
        return Ok(());
    }

    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailroom=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("MAILROOM_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: MAILROOM_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let host = std::env::var("MAILROOM_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("MAILROOM_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let db_path: PathBuf = std::env::var("MAILROOM_DB_PATH")
        .unwrap_or_else(|_| "mailroom.db".into())
        .into();
    let public_url =
        std::env::var("MAILROOM_PUBLIC_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let admin_user = std::env::var("MAILROOM_ADMIN_USER").unwrap_or_else(|_| "admin".into());
    let admin_password_hash = std::env::var("MAILROOM_ADMIN_PASSWORD_HASH")
        .ok()
        .filter(|v| !v.trim().is_empty());
    if admin_password_hash.is_none() {
        warn!("MAILROOM_ADMIN_PASSWORD_HASH is not set; admin login is disabled");
    }

    let batch_settings = BatchSettings {
        batch_size: env_parse("MAILROOM_BATCH_SIZE", DEFAULT_BATCH_SIZE),
        batch_interval_seconds: env_parse("MAILROOM_BATCH_INTERVAL_SECS", DEFAULT_BATCH_INTERVAL_SECS),
    };
    let poll_interval = std::env::var("MAILROOM_SCHEDULER_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_POLL_INTERVAL);

    // Init database
    let store: Arc<dyn Store> = Arc::new(Database::open(&db_path)?);

    // Mail transport
    let transport: Arc<dyn MailTransport> = match SmtpConfig::from_env()? {
        Some(config) => Arc::new(SmtpTransport::new(&config, public_url.clone())?),
        None => {
            warn!("SMTP_HOST is not set; emails will be logged instead of sent");
            Arc::new(LogTransport::new(public_url.clone()))
        }
    };

    let batch = Arc::new(BatchConfig::new(batch_settings)?);
    info!(
        "Batch config: {} per batch, {}s pause",
        batch_settings.batch_size, batch_settings.batch_interval_seconds
    );

    let dispatcher = CampaignDispatcher::new(store.clone(), transport, batch);

    // Background scheduler
    let scheduler = DispatchScheduler::new(store.clone(), dispatcher.clone(), poll_interval)?;
    tokio::spawn(scheduler.run());

    let state: AppState = Arc::new(AppStateInner {
        campaigns: CampaignService::new(store.clone(), dispatcher.clone()),
        contacts: ContactService::new(store),
        tokens: dispatcher.tokens().clone(),
        jwt_secret,
        admin_user,
        admin_password_hash,
    });

    let app = mailroom_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Mailroom listening on {} (public URL {})", addr, public_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Parses an env var, falling back to `default` when unset or malformed.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
