//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::email::{LogMailer, Mailer, SmtpMailer};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Authgate",
    about = "Stateless authentication service with email verification"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7391")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "authgate.db")]
    pub database: String,

    /// Public origin used in verification links (full URL, e.g., "https://example.com")
    #[arg(long, default_value = "http://localhost:7391")]
    pub public_origin: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// SMTP relay host. Without it, outbound email is logged instead of sent
    #[arg(long)]
    pub smtp_host: Option<String>,

    /// SMTP relay port
    #[arg(long, default_value = "587")]
    pub smtp_port: u16,

    /// SMTP username
    #[arg(long, env = "SMTP_USERNAME")]
    pub smtp_username: Option<String>,

    /// SMTP password
    #[arg(long, env = "SMTP_PASSWORD")]
    pub smtp_password: Option<String>,

    /// From address for outbound email
    #[arg(long, default_value = "no-reply@localhost")]
    pub email_from: String,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the public-origin URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_origin(public_origin: &str) -> Option<Url> {
    let url = match Url::parse(public_origin) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %public_origin, error = %e, "Invalid public-origin URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_localhost = url.host_str() == Some("localhost");

    if !is_https && !is_localhost {
        error!("public-origin must use HTTPS for non-localhost deployments");
        return None;
    }

    Some(url)
}

/// Build the mailer from SMTP arguments, falling back to log-only delivery
/// when no relay host is configured.
pub fn build_mailer(args: &Args) -> Option<Arc<dyn Mailer>> {
    match &args.smtp_host {
        Some(host) => match SmtpMailer::new(
            host,
            args.smtp_port,
            args.smtp_username.clone(),
            args.smtp_password.clone(),
            args.email_from.clone(),
        ) {
            Ok(mailer) => Some(Arc::new(mailer)),
            Err(e) => {
                error!(error = %e, "Failed to configure SMTP mailer");
                None
            }
        },
        None => {
            warn!("No SMTP relay configured; verification emails will only be logged");
            Some(Arc::new(LogMailer))
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    db: Database,
    public_origin: Url,
    jwt_secret: String,
    mailer: Arc<dyn Mailer>,
) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        public_origin,
        mailer,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
