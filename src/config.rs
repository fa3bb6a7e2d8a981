// Configuration lue depuis l'environnement (.env chargé par dotenv dans main)

use std::env;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in .env file")]
    Missing(&'static str),

    #[error("Failed to parse {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub site_url: String,
    pub site_name: String,
    pub default_from_email: String,
    /// Relais HTTP d'envoi des emails ; absent => emails seulement loggés
    pub mail_relay_url: Option<String>,
    /// Signataire "Course Director" des certificats
    pub course_director: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Construit la config depuis une fonction de lecture (testable sans
    /// toucher aux variables d'environnement du process)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let host_raw = lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let host = host_raw.parse::<IpAddr>().map_err(|_| ConfigError::Invalid {
            key: "SERVER_HOST",
            value: host_raw.clone(),
        })?;

        let port_raw = lookup("SERVER_PORT").unwrap_or_else(|| "8080".to_string());
        let port = port_raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
            key: "SERVER_PORT",
            value: port_raw.clone(),
        })?;

        let site_url = lookup("SITE_URL")
            .unwrap_or_else(|| "https://lumdataacademy.org".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(AppConfig {
            database_url,
            host,
            port,
            site_url,
            site_name: lookup("SITE_NAME").unwrap_or_else(|| "LUM Data Academy".to_string()),
            default_from_email: lookup("DEFAULT_FROM_EMAIL")
                .unwrap_or_else(|| "noreply@lumdataacademy.org".to_string()),
            mail_relay_url: lookup("MAIL_RELAY_URL").filter(|url| !url.trim().is_empty()),
            course_director: lookup("COURSE_DIRECTOR").unwrap_or_else(|| "David Joel".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/lum")]))
            .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.host.to_string(), "127.0.0.1");
        assert_eq!(config.site_url, "https://lumdataacademy.org");
        assert_eq!(config.site_name, "LUM Data Academy");
        assert!(config.mail_relay_url.is_none());
    }

    #[test]
    fn test_missing_database_url() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_invalid_port() {
        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/lum"),
            ("SERVER_PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SERVER_PORT", .. }));
    }

    #[test]
    fn test_site_url_trailing_slash_and_blank_relay() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/lum"),
            ("SITE_URL", "https://academy.example/"),
            ("MAIL_RELAY_URL", "  "),
        ]))
        .unwrap();
        assert_eq!(config.site_url, "https://academy.example");
        assert!(config.mail_relay_url.is_none());
    }
}
