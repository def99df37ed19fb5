use anyhow::Result;
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins. Empty blocks all cross-origin requests.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    /// Soft page size for list queries; the store client falls back to 2.
    pub max_pagination_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub algorithm: String,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl AuthConfig {
    /// Signing algorithm; `validate` guarantees this parses to an HMAC variant.
    pub fn jwt_algorithm(&self) -> Result<Algorithm> {
        let alg = Algorithm::from_str(&self.algorithm)
            .map_err(|e| anyhow::anyhow!("Unknown JWT algorithm '{}': {}", self.algorithm, e))?;
        match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(alg),
            other => anyhow::bail!(
                "JWT algorithm {:?} needs a key pair; only HS256, HS384 and HS512 work with a shared secret",
                other
            ),
        }
    }
}

impl DatabaseConfig {
    pub fn database_name(&self) -> &str {
        self.name.as_deref().unwrap_or("person-registry")
    }
}

fn default_bind() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8000 }
fn default_backend() -> BackendKind { BackendKind::Mongo }
fn default_bcrypt_cost() -> u32 { bcrypt::DEFAULT_COST }

/// Flat variable names kept from the original deployment, mapped onto config keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("MONGO_HOST", "database.host"),
    ("MONGO_PORT", "database.port"),
    ("MONGO_USER", "database.username"),
    ("MONGO_PASS", "database.password"),
    ("MONGO_DATABASE", "database.name"),
    ("JWT_SECRET", "auth.jwt_secret"),
    ("ALGORITHM", "auth.algorithm"),
];

pub fn validate(cfg: &Config) -> Result<()> {
    if cfg.auth.jwt_secret.trim().is_empty() {
        anyhow::bail!("CONFIG ERROR: JWT secret must not be empty (set JWT_SECRET)");
    }

    cfg.auth.jwt_algorithm()?;

    if !(4..=31).contains(&cfg.auth.bcrypt_cost) {
        anyhow::bail!(
            "CONFIG ERROR: bcrypt cost must be between 4 and 31 (current: {})",
            cfg.auth.bcrypt_cost
        );
    }

    if cfg.database.backend == BackendKind::Mongo {
        let db = &cfg.database;
        let missing: Vec<&str> = [
            ("host", db.host.is_none()),
            ("port", db.port.is_none()),
            ("username", db.username.is_none()),
            ("password", db.password.is_none()),
            ("name", db.name.is_none()),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();

        if !missing.is_empty() {
            anyhow::bail!(
                "CONFIG ERROR: missing database setting(s): {}",
                missing.join(", ")
            );
        }
    }

    tracing::info!("Configuration validation passed");
    Ok(())
}

pub fn load() -> Result<Config> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(config::Environment::with_prefix("PERSON_REGISTRY").separator("__"))
        .set_default("server.bind", "127.0.0.1")?
        .set_default("server.port", 8000)?
        .set_default("database.backend", "mongo")?;

    for (var, key) in LEGACY_ENV {
        builder = builder.set_override_option(*key, std::env::var(var).ok())?;
    }

    let cfg: Config = builder.build()?.try_deserialize()?;

    validate(&cfg)?;

    Ok(cfg)
}
