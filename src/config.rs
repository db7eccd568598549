use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

/// Pricing and fulfillment knobs. All money values are integer cents.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StorefrontConfig {
    /// Orders at or above this (post-discount) amount ship free.
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold_cents: i64,

    /// Flat shipping fee below the threshold.
    #[serde(default = "default_shipping_fee")]
    pub shipping_fee_cents: i64,

    /// Flat discount rate for business (P.IVA) customers, always applied.
    #[serde(default = "default_piva_rate")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub piva_discount_rate: f64,

    /// First-order discount rate for private customers.
    #[serde(default = "default_first_order_rate")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub first_order_discount_rate: f64,

    /// Slug of the bundle product whose price is tiered by customer type.
    /// Matched case-insensitively after trimming.
    #[serde(default = "default_bundle_slug")]
    pub bundle_slug: String,

    /// Bundle unit price for P.IVA customers.
    #[serde(default = "default_bundle_price_piva")]
    pub bundle_price_piva_cents: i64,

    /// Bundle unit price for private customers.
    #[serde(default = "default_bundle_price_private")]
    pub bundle_price_private_cents: i64,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            free_shipping_threshold_cents: default_free_shipping_threshold(),
            shipping_fee_cents: default_shipping_fee(),
            piva_discount_rate: default_piva_rate(),
            first_order_discount_rate: default_first_order_rate(),
            bundle_slug: default_bundle_slug(),
            bundle_price_piva_cents: default_bundle_price_piva(),
            bundle_price_private_cents: default_bundle_price_private(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StripeConfig {
    /// API secret key (`sk_...`). Empty disables checkout-session creation.
    #[serde(default)]
    pub secret_key: String,

    /// Webhook signing secret (`whsec_...`). Empty disables webhook handling.
    #[serde(default)]
    pub webhook_secret: String,

    /// Accepted clock skew for webhook signature timestamps, in seconds.
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BankTransferConfig {
    #[serde(default = "default_bank_beneficiary")]
    pub beneficiary: String,

    #[serde(default)]
    pub iban: String,

    /// Hours the customer has to complete the transfer.
    #[serde(default = "default_bank_deadline_hours")]
    pub payment_deadline_hours: u32,
}

impl Default for BankTransferConfig {
    fn default() -> Self {
        Self {
            beneficiary: default_bank_beneficiary(),
            iban: String::new(),
            payment_deadline_hours: default_bank_deadline_hours(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NotifierConfig {
    /// HTTP endpoint of the transactional-email relay. Empty selects the
    /// no-op notifier (emails are logged, not sent).
    #[serde(default)]
    pub email_endpoint: String,

    #[serde(default)]
    pub email_api_key: String,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT signing secret (minimum 64 characters)
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    pub jwt_expiration: usize,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Public base URL of the storefront, used for checkout redirects.
    #[serde(default = "default_public_base_url")]
    #[validate(url)]
    pub public_base_url: String,

    /// UTC offset in minutes applied when bucketing dashboard stats by day.
    #[serde(default = "default_stats_utc_offset")]
    pub stats_utc_offset_minutes: i32,

    #[serde(default)]
    #[validate]
    pub storefront: StorefrontConfig,

    #[serde(default)]
    #[validate]
    pub stripe: StripeConfig,

    #[serde(default)]
    #[validate]
    pub bank_transfer: BankTransferConfig,

    #[serde(default)]
    #[validate]
    pub notifier: NotifierConfig,
}

fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_stats_utc_offset() -> i32 {
    60
}
fn default_free_shipping_threshold() -> i64 {
    12_000
}
fn default_shipping_fee() -> i64 {
    700
}
fn default_piva_rate() -> f64 {
    0.15
}
fn default_first_order_rate() -> f64 {
    0.10
}
fn default_bundle_slug() -> String {
    "SET EXPERIENCE".to_string()
}
fn default_bundle_price_piva() -> i64 {
    5_400
}
fn default_bundle_price_private() -> i64 {
    6_000
}
fn default_webhook_tolerance() -> i64 {
    300
}
fn default_bank_beneficiary() -> String {
    "Storefront S.r.l.".to_string()
}
fn default_bank_deadline_hours() -> u32 {
    48
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    // Reject secrets that are one repeated character, whatever the length.
    let mut chars = secret.chars();
    if let Some(first) = chars.next() {
        if chars.all(|c| c == first) {
            return Err(ValidationError::new("jwt_secret_low_entropy"));
        }
    }
    Ok(())
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP_*, `__` as section separator)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // jwt_secret has no default; it must come from a file or the environment.
    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("jwt_expiration", 3600)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", default_port() as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to a secure random string of at least 64 characters.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"
                .to_string(),
            jwt_expiration: 3600,
            host: "127.0.0.1".to_string(),
            port: 8080,
            environment: "test".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            auto_migrate: true,
            public_base_url: default_public_base_url(),
            stats_utc_offset_minutes: default_stats_utc_offset(),
            storefront: StorefrontConfig::default(),
            stripe: StripeConfig::default(),
            bank_transfer: BankTransferConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let mut cfg = base_config();
        cfg.jwt_secret = "short".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn repeated_character_secret_is_rejected() {
        let mut cfg = base_config();
        cfg.jwt_secret = "a".repeat(64);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn storefront_defaults_match_pricing_rules() {
        let sf = StorefrontConfig::default();
        assert_eq!(sf.free_shipping_threshold_cents, 12_000);
        assert_eq!(sf.shipping_fee_cents, 700);
        assert_eq!(sf.bundle_price_piva_cents, 5_400);
        assert_eq!(sf.bundle_price_private_cents, 6_000);
    }

    #[test]
    fn bank_transfer_deadline_is_expressed_in_hours() {
        let bank = BankTransferConfig::default();
        assert_eq!(bank.payment_deadline_hours, 48);
    }
}
