//! ABOUTME: Configuration management with validation and environment loading
//! ABOUTME: Handles all application settings from environment variables and files

use config::{Config as ConfigBuilder, Environment, File};
use pm_core::{Error, Result};
use pm_pay::ProcessorConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Environment variable prefix for every setting
pub const ENV_PREFIX: &str = "PLANMARKET";

/// Settings whose keys contain underscores and therefore cannot be reached
/// through the `_`-separated environment source
const UNDERSCORE_OVERRIDES: &[(&str, &str)] = &[
    ("PLANMARKET_SERVER_OBS_PORT", "server.obs_port"),
    ("PLANMARKET_SERVER_JSON_LIMIT", "server.json_limit"),
    ("PLANMARKET_DATABASE_POOL_SIZE", "database.pool_size"),
    ("PLANMARKET_SECURITY_JWT_SECRET", "security.jwt_secret"),
    ("PLANMARKET_SECURITY_SECURE_COOKIES", "security.secure_cookies"),
    ("PLANMARKET_MARKETPLACE_PLATFORM_FEE_BPS", "marketplace.platform_fee_bps"),
    ("PLANMARKET_MARKETPLACE_DEFAULT_CURRENCY", "marketplace.default_currency"),
    ("PLANMARKET_MARKETPLACE_MIN_PAYOUT_CENTS", "marketplace.min_payout_cents"),
    ("PLANMARKET_MARKETPLACE_PAYOUT_HOLD_DAYS", "marketplace.payout_hold_days"),
    ("PLANMARKET_PAYMENTS_USE_ONLINE", "payments.use_online"),
    ("PLANMARKET_PAYMENTS_BASE_URL", "payments.base_url"),
    ("PLANMARKET_PAYMENTS_API_KEY", "payments.api_key"),
    ("PLANMARKET_PAYMENTS_TIMEOUT_SECONDS", "payments.timeout_seconds"),
    ("PLANMARKET_PAYMENTS_MAX_RETRIES", "payments.max_retries"),
];

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    /// "development" or "production"; selects the log format
    pub environment: String,
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub security: SecurityConfig,
    #[validate(nested)]
    pub marketplace: MarketplaceConfig,
    #[validate(nested)]
    pub payments: PaymentsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
    #[validate(range(min = 1, max = 65535))]
    pub obs_port: u16,
    /// Maximum accepted JSON body in bytes
    #[validate(range(min = 1024, max = 10485760))] // 1KB to 10MB
    pub json_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            obs_port: 9000,
            json_limit: 262_144,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub path: String,
    #[validate(range(min = 1, max = 100))]
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "planmarket.db".to_string(),
            pool_size: 10,
        }
    }
}

/// Security configuration with secret redaction
#[derive(Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct SecurityConfig {
    #[validate(length(min = 32))]
    pub jwt_secret: String,
    /// Whether to use secure cookies (requires HTTPS)
    pub secure_cookies: bool,
}

fn insecure_default_secret() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("INSECURE-RANDOM-{}-CHANGE-IN-PRODUCTION", timestamp)
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: insecure_default_secret(),
            secure_cookies: false,
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("secure_cookies", &self.secure_cookies)
            .finish()
    }
}

/// Marketplace business rules
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct MarketplaceConfig {
    /// Platform share of every sale in basis points (1000 = 10%)
    #[validate(range(max = 5000))]
    pub platform_fee_bps: u32,
    #[validate(length(equal = 3))]
    pub default_currency: String,
    /// Smallest payout a seller may request
    #[validate(range(min = 1))]
    pub min_payout_cents: i64,
    /// Days a completed sale is held before it can be paid out
    #[validate(range(max = 90))]
    pub payout_hold_days: u32,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            platform_fee_bps: 1000,
            default_currency: "EUR".to_string(),
            min_payout_cents: 1000,
            payout_hold_days: 7,
        }
    }
}

/// Payment processor connection with secret redaction
#[derive(Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct PaymentsConfig {
    pub use_online: bool,
    #[validate(url)]
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64,
    #[validate(range(max = 10))]
    pub max_retries: u32,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            use_online: false,
            base_url: None,
            api_key: None,
            timeout_seconds: 30,
            max_retries: 3,
        }
    }
}

impl fmt::Debug for PaymentsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentsConfig")
            .field("use_online", &self.use_online)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl From<&PaymentsConfig> for ProcessorConfig {
    fn from(cfg: &PaymentsConfig) -> Self {
        ProcessorConfig {
            use_online: cfg.use_online,
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
            timeout_seconds: cfg.timeout_seconds,
            max_retries: cfg.max_retries,
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional `planmarket.{toml,yaml,json}`
    /// file and `PLANMARKET_*` environment variables (highest priority)
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder()
            .set_default("environment", "development")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.obs_port", 9000)?
            .set_default("server.json_limit", 262_144)?
            .set_default("database.path", "planmarket.db")?
            .set_default("database.pool_size", 10)?
            .set_default("security.jwt_secret", insecure_default_secret())?
            .set_default("security.secure_cookies", false)?
            .set_default("marketplace.platform_fee_bps", 1000)?
            .set_default("marketplace.default_currency", "EUR")?
            .set_default("marketplace.min_payout_cents", 1000)?
            .set_default("marketplace.payout_hold_days", 7)?
            .set_default("payments.use_online", false)?
            .set_default("payments.timeout_seconds", 30)?
            .set_default("payments.max_retries", 3)?;

        let file_name =
            std::env::var("PLANMARKET_CONFIG").unwrap_or_else(|_| "planmarket".to_string());
        builder = builder.add_source(File::with_name(&file_name).required(false));

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("_"),
        );

        for (var, key) in UNDERSCORE_OVERRIDES {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_override(*key, value)?;
            }
        }

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        parsed
            .validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))?;
        pm_core::money::validate_currency(&parsed.marketplace.default_currency)
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(parsed)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "PLANMARKET_SERVER_HOST",
            "PLANMARKET_SERVER_PORT",
            "PLANMARKET_DATABASE_PATH",
        ] {
            env::remove_var(var);
        }
        for (var, _) in UNDERSCORE_OVERRIDES {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = Config::load().expect("Should load with defaults");

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, "planmarket.db");
        assert_eq!(config.database.pool_size, 10);
        assert_eq!(config.marketplace.platform_fee_bps, 1000);
        assert_eq!(config.marketplace.default_currency, "EUR");
        assert_eq!(config.marketplace.payout_hold_days, 7);
        assert!(!config.payments.use_online);
        assert!(!config.is_production());
    }

    #[test]
    fn test_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("PLANMARKET_SERVER_HOST", "0.0.0.0");
        env::set_var("PLANMARKET_SERVER_PORT", "9100");
        env::set_var("PLANMARKET_SECURITY_JWT_SECRET", "valid32characterjwtsecretfortest");
        env::set_var("PLANMARKET_MARKETPLACE_PLATFORM_FEE_BPS", "1500");
        env::set_var("PLANMARKET_MARKETPLACE_PAYOUT_HOLD_DAYS", "0");

        let config = Config::load().expect("Should load from env");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.security.jwt_secret, "valid32characterjwtsecretfortest");
        assert_eq!(config.marketplace.platform_fee_bps, 1500);
        assert_eq!(config.marketplace.payout_hold_days, 0);

        clear_env();
    }

    #[test]
    fn test_fee_above_limit_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("PLANMARKET_MARKETPLACE_PLATFORM_FEE_BPS", "7500");
        assert!(Config::load().is_err());

        clear_env();
    }

    #[test]
    fn test_pool_size_validation_failure() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("PLANMARKET_DATABASE_POOL_SIZE", "200");
        assert!(Config::load().is_err());

        clear_env();
    }

    #[test]
    fn test_lowercase_currency_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("PLANMARKET_MARKETPLACE_DEFAULT_CURRENCY", "eur");
        assert!(Config::load().is_err());

        clear_env();
    }

    #[test]
    fn test_jwt_secret_too_short() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("PLANMARKET_SECURITY_JWT_SECRET", "short");
        assert!(Config::load().is_err());

        clear_env();
    }

    #[test]
    fn test_secret_redaction() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("PLANMARKET_PAYMENTS_API_KEY", "sk_live_very_secret");
        let config = Config::load().expect("Should load with defaults");
        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("INSECURE-RANDOM"));
        assert!(!debug_output.contains("sk_live_very_secret"));

        clear_env();
    }

    #[test]
    fn test_processor_config_conversion() {
        let payments = PaymentsConfig {
            use_online: true,
            base_url: Some("https://payments.example.com".to_string()),
            api_key: Some("key".to_string()),
            timeout_seconds: 5,
            max_retries: 1,
        };
        let processor: ProcessorConfig = (&payments).into();
        assert!(processor.use_online);
        assert_eq!(processor.timeout_seconds, 5);
        assert_eq!(processor.max_retries, 1);
        assert_eq!(processor.base_url.as_deref(), Some("https://payments.example.com"));
    }
}
