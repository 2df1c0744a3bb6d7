use anyhow::Context;
use serde::Deserialize;

const PLACEHOLDER_SUFFIX: &str = "_here";

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Credentials for the hosted database + identity service.
#[derive(Debug, Clone, Deserialize)]
pub struct HostedConfig {
    pub url: String,
    pub anon_key: String,
    pub service_role_key: String,
    pub database_url: String,
}

/// S3-compatible object storage for uploaded photos.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cookie_secure: bool,
    pub jwt: JwtConfig,
    /// `None` selects the in-memory fallback backend.
    pub hosted: Option<HostedConfig>,
    /// `None` selects in-memory photo storage.
    pub storage: Option<StorageConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "alumni".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "alumni-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };

        let port = std::env::var("APP_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);

        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            cookie_secure: env_flag("COOKIE_SECURE").unwrap_or(false),
            jwt,
            hosted: hosted_from_env(),
            storage: storage_from_env(),
        })
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| parse_flag(&v))
}

/// `None` for anything that is not a recognisable boolean.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_placeholder(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.ends_with(PLACEHOLDER_SUFFIX))
}

fn hosted_from_env() -> Option<HostedConfig> {
    if env_flag("HOSTED_BACKEND_ENABLED") == Some(false) {
        tracing::info!("hosted backend explicitly disabled");
        return None;
    }
    let hosted = HostedConfig {
        url: non_placeholder("HOSTED_URL")?.trim_end_matches('/').to_string(),
        anon_key: non_placeholder("HOSTED_ANON_KEY")?,
        service_role_key: non_placeholder("HOSTED_SERVICE_ROLE_KEY")?,
        database_url: non_placeholder("DATABASE_URL")?,
    };
    Some(hosted)
}

fn storage_from_env() -> Option<StorageConfig> {
    let endpoint = non_placeholder("STORAGE_ENDPOINT")?;
    let bucket = std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "photos".into());
    let public_url = std::env::var("STORAGE_PUBLIC_URL")
        .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
    Some(StorageConfig {
        access_key: non_placeholder("STORAGE_ACCESS_KEY")?,
        secret_key: non_placeholder("STORAGE_SECRET_KEY")?,
        region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".into()),
        public_url: public_url.trim_end_matches('/').to_string(),
        endpoint,
        bucket,
    })
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            cookie_secure: false,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "alumni".into(),
                audience: "alumni-users".into(),
                ttl_minutes: 60 * 24,
            },
            hosted: None,
            storage: None,
        }
    }
}
