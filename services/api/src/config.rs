//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;

use forum_core::ListingConfig;
use tracing::Level;
use url::Url;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// SMTP credentials for the notification mailer.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Implicit TLS when true, STARTTLS otherwise.
    pub secure: bool,
    pub username: String,
    pub password: String,
    /// The From address of outgoing notifications.
    pub email: String,
    /// The From display name of outgoing notifications.
    pub name: String,
    pub reply_to: Option<String>,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,
    pub google_client_id: String,
    pub page_size: i64,
    pub question_preview_length: usize,
    pub own_answer_preview_length: usize,
    /// Where OAuth results are delivered when the client asks for a redirect
    /// response instead of a JSON body.
    pub frontend_oauth_response_url: Url,
    /// Link templates for notification emails. Placeholder segments such as
    /// `{questionId}` are substituted when the email is composed.
    pub new_answer_url_template: String,
    pub new_reply_url_template: String,
    /// Absent when no SMTP host is configured; notifications are then logged
    /// instead of delivered.
    pub smtp: Option<SmtpConfig>,
}

/// Reads an environment variable and parses it, falling back to a default
/// when the variable is unset.
fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn require_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = require_var("DATABASE_URL")?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load Auth Settings ---
        let google_client_id = require_var("GOOGLE_CLIENT_ID")?;

        let frontend_oauth_response_url_str = std::env::var("FRONTEND_OAUTH_RESPONSE_URL")
            .unwrap_or_else(|_| "http://localhost:3000/oauth".to_string());
        let frontend_oauth_response_url =
            Url::parse(&frontend_oauth_response_url_str).map_err(|e| {
                ConfigError::InvalidValue("FRONTEND_OAUTH_RESPONSE_URL".to_string(), e.to_string())
            })?;

        // --- Load Listing Settings ---
        let page_size = parse_var("PAGE_SIZE", 10i64)?;
        let question_preview_length = parse_var("QUESTION_PREVIEW_LENGTH", 80usize)?;
        let own_answer_preview_length = parse_var("OWN_ANSWER_PREVIEW_LENGTH", 80usize)?;

        // --- Load Notification Settings ---
        let new_answer_url_template = std::env::var("NEW_ANSWER_URL_TEMPLATE").unwrap_or_else(
            |_| "http://localhost:3000/questions/{questionId}#{answerId}".to_string(),
        );
        let new_reply_url_template = std::env::var("NEW_REPLY_URL_TEMPLATE").unwrap_or_else(|_| {
            "http://localhost:3000/questions/{questionId}/answers/{repliedToAnswerId}#{answerId}"
                .to_string()
        });

        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: parse_var("SMTP_PORT", 587u16)?,
                secure: parse_var("SMTP_SECURE", false)?,
                username: require_var("SMTP_USERNAME")?,
                password: require_var("SMTP_PASSWORD")?,
                email: require_var("SMTP_EMAIL")?,
                name: std::env::var("SMTP_NAME").unwrap_or_else(|_| "Forum".to_string()),
                reply_to: std::env::var("SMTP_REPLY_TO").ok(),
            }),
            Err(_) => None,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            google_client_id,
            page_size,
            question_preview_length,
            own_answer_preview_length,
            frontend_oauth_response_url,
            new_answer_url_template,
            new_reply_url_template,
            smtp,
        })
    }

    /// The listing tunables shared with the core engine.
    pub fn listing(&self) -> ListingConfig {
        ListingConfig {
            page_size: self.page_size,
            preview_length: self.question_preview_length,
        }
    }
}
