use std::{env, net::SocketAddr};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub cookie_secret: String,
    pub session_ttl_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://viajes.db".to_string());
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let cookie_secret = env::var("COOKIE_SECRET")
            .unwrap_or_else(|_| "change-me-viajes-development-cookie-secret".to_string());

        let session_ttl_hours = match env::var("SESSION_TTL_HOURS") {
            Ok(raw) => parse_ttl(&raw)?,
            Err(_) => 24 * 7,
        };

        Ok(Self {
            database_url,
            listen_addr,
            cookie_secret,
            session_ttl_hours,
        })
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}

fn parse_ttl(raw: &str) -> Result<i64, AppError> {
    match raw.trim().parse::<i64>() {
        Ok(hours) if hours > 0 => Ok(hours),
        _ => Err(AppError::Config(format!(
            "invalid SESSION_TTL_HOURS: {raw:?} is not a positive integer"
        ))),
    }
}
