//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, FsDocumentStore, InMemoryDb, LogMailer, SmtpMailer},
    config::{BootstrapAdmin, Config},
    error::ApiError,
    web::{self, auth::hash_password, state::AppState},
};
use lms_core::domain::NewUser;
use lms_core::ports::{DatabaseService, MailService, PortError};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Creates the configured superuser unless an account with that name exists.
async fn ensure_bootstrap_admin(
    db: &dyn DatabaseService,
    admin: &BootstrapAdmin,
) -> Result<(), ApiError> {
    match db.get_user_by_username(&admin.username).await {
        Ok(_) => {
            info!("Bootstrap admin '{}' already exists.", admin.username);
            return Ok(());
        }
        Err(PortError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }
    let hashed_password = hash_password(&admin.password)
        .map_err(|e| ApiError::Internal(format!("Failed to hash bootstrap password: {e}")))?;
    db.create_user(NewUser {
        username: admin.username.clone(),
        email: String::new(),
        first_name: String::new(),
        last_name: String::new(),
        hashed_password,
        is_teacher: false,
        is_superuser: true,
        department_id: None,
    })
    .await?;
    info!("Created bootstrap admin '{}'.", admin.username);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let db: Arc<dyn DatabaseService> = if config.uses_memory_store() {
        warn!("Using the in-memory store; all data is lost on shutdown.");
        Arc::new(InMemoryDb::new())
    } else {
        info!("Connecting to database...");
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await?;
        let db_adapter = DbAdapter::new(db_pool);
        info!("Running database migrations...");
        db_adapter.run_migrations().await?;
        info!("Database migrations complete.");
        Arc::new(db_adapter)
    };

    if let Some(admin) = &config.bootstrap_admin {
        ensure_bootstrap_admin(db.as_ref(), admin).await?;
    }

    // --- 3. Initialize Service Adapters ---
    tokio::fs::create_dir_all(&config.media_root).await?;
    let documents = Arc::new(FsDocumentStore::new(config.media_root.clone()));

    let mailer: Arc<dyn MailService> = match &config.smtp {
        Some(smtp) => {
            info!("Sending mail through {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpMailer::new(smtp, &config.mail_from)?)
        }
        None => {
            warn!("SMTP_HOST is not set; outbound mail will only be logged.");
            Arc::new(LogMailer)
        }
    };

    // --- 4. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState {
        db,
        documents,
        mailer,
        config: config.clone(),
    });
    let app = web::router(app_state);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
