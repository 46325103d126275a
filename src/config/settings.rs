//! Connection settings read from the environment.

use sqlx::{AnyConnection, Connection};

pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DbSettings {
    pub url: String,
}

impl DbSettings {
    pub fn new(url: impl Into<String>) -> Self {
        DbSettings { url: url.into() }
    }

    /// `DATABASE_URL`, after loading a `.env` file when one exists.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        DbSettings { url }
    }

    pub async fn connect(&self) -> Result<AnyConnection, sqlx::Error> {
        sqlx::any::install_default_drivers();
        let conn = AnyConnection::connect(&self.url).await?;
        tracing::info!(backend = conn.backend_name(), "database connected");
        Ok(conn)
    }
}

impl Default for DbSettings {
    fn default() -> Self {
        DbSettings::new(DEFAULT_DATABASE_URL)
    }
}
