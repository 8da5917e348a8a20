use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::bot_service::BotProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSource {
    Static,
    Mongo,
}

impl FromStr for QuestionSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(QuestionSource::Static),
            "mongo" => Ok(QuestionSource::Mongo),
            other => Err(format!("unknown question source '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DuelSettings {
    pub turn_duration_seconds: u64,
    pub max_write_attempts: usize,
    pub sse_tick_interval_ms: u64,
}

impl DuelSettings {
    pub fn turn_duration(&self) -> Duration {
        Duration::from_secs(self.turn_duration_seconds)
    }

    pub fn sse_tick_interval(&self) -> Duration {
        Duration::from_millis(self.sse_tick_interval_ms)
    }
}

impl Default for DuelSettings {
    fn default() -> Self {
        Self {
            turn_duration_seconds: 30,
            max_write_attempts: 3,
            sse_tick_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub redis_uri: String,
    pub duel_ttl_seconds: u64,
    pub question_source: QuestionSource,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub duel: DuelSettings,
    pub bots: Vec<BotProfile>,
}

impl Default for Config {
    /// Self-contained setup: in-memory store, built-in questions, default bots.
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8081".to_string(),
            store_backend: StoreBackend::Memory,
            redis_uri: "redis://127.0.0.1:6379/0".to_string(),
            duel_ttl_seconds: 24 * 60 * 60,
            question_source: QuestionSource::Static,
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "duel_arena".to_string(),
            jwt_secret: "dev-secret-only-for-local-testing".to_string(),
            duel: DuelSettings::default(),
            bots: BotProfile::defaults(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (two levels up), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + ENV overrides (prefix: APP__)
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or(defaults.bind_addr);

        let store_backend =
            parse_setting(&settings, "store.backend", "DUEL_STORE", defaults.store_backend)?;

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                match env::var("REDIS_PASSWORD") {
                    Ok(password) => format!("redis://:{}@{}:{}/0", password, host, port),
                    Err(_) => format!("redis://{}:{}/0", host, port),
                }
            });

        let duel_ttl_seconds = parse_setting(
            &settings,
            "store.duel_ttl_seconds",
            "DUEL_TTL_SECONDS",
            defaults.duel_ttl_seconds,
        )?;

        let question_source = parse_setting(
            &settings,
            "questions.source",
            "QUESTION_SOURCE",
            defaults.question_source,
        )?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or(defaults.mongo_uri);

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                defaults.jwt_secret
            }
        };

        let duel = DuelSettings {
            turn_duration_seconds: parse_setting(
                &settings,
                "duel.turn_duration_seconds",
                "TURN_DURATION_SECONDS",
                defaults.duel.turn_duration_seconds,
            )?,
            max_write_attempts: parse_setting(
                &settings,
                "duel.max_write_attempts",
                "MAX_WRITE_ATTEMPTS",
                defaults.duel.max_write_attempts,
            )?,
            sse_tick_interval_ms: parse_setting(
                &settings,
                "duel.sse_tick_interval_ms",
                "SSE_TICK_INTERVAL_MS",
                defaults.duel.sse_tick_interval_ms,
            )?,
        };
        if duel.turn_duration_seconds == 0 || duel.sse_tick_interval_ms == 0 {
            return Err(config::ConfigError::Message(
                "duel.turn_duration_seconds and duel.sse_tick_interval_ms must be positive"
                    .to_string(),
            ));
        }

        let bots = match settings.get::<Vec<BotProfile>>("bots") {
            Ok(bots) => bots,
            Err(config::ConfigError::NotFound(_)) => defaults.bots,
            Err(e) => return Err(e),
        };
        if let Some(bad) = bots
            .iter()
            .find(|b| !BotProfile::is_bot_id(&b.id) || !(0.0..=1.0).contains(&b.accuracy_probability))
        {
            return Err(config::ConfigError::Message(format!(
                "invalid bot profile '{}': ids start with 'bot:' and accuracy is within 0..=1",
                bad.id
            )));
        }

        Ok(Config {
            bind_addr,
            store_backend,
            redis_uri,
            duel_ttl_seconds,
            question_source,
            mongo_uri,
            mongo_database,
            jwt_secret,
            duel,
            bots,
        })
    }
}

/// Reads `key` from the layered settings, then the plain `env_key` variable,
/// then falls back to `default`. Present but unparsable values are errors.
fn parse_setting<T>(
    settings: &config::Config,
    key: &str,
    env_key: &str,
    default: T,
) -> Result<T, config::ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = match settings.get_string(key).or_else(|_| env::var(env_key)) {
        Ok(raw) => raw,
        Err(_) => return Ok(default),
    };
    raw.trim()
        .parse::<T>()
        .map_err(|e| config::ConfigError::Message(format!("{}: {}", key, e)))
}
