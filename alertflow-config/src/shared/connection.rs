use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

/// Connection configuration for the Postgres database backing the pipeline.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid
/// accidentally leaking the password into serialized forms.
#[derive(Clone, Debug, Deserialize)]
pub struct PgConnectionConfig {
    /// Host on which Postgres is running.
    pub host: String,
    /// Port on which Postgres is running.
    pub port: u16,
    /// Database name.
    pub name: String,
    /// Username for authentication.
    pub username: String,
    /// Optional password for authentication.
    pub password: Option<SecretString>,
}

impl PgConnectionConfig {
    /// Builds sqlx connect options targeting the configured database.
    pub fn with_db(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.username);

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_without_password() {
        let config: PgConnectionConfig = serde_json::from_str(
            r#"{"host": "localhost", "port": 5433, "name": "postgres", "username": "postgres"}"#,
        )
        .unwrap();

        assert_eq!(config.port, 5433);
        assert!(config.password.is_none());
    }
}
