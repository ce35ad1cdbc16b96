//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

use crate::policy::RatePolicy;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    pub billing: BillingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

/// Redis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// TTL for published wallet snapshots in seconds
    #[serde(default = "default_snapshot_ttl")]
    pub snapshot_ttl_secs: u64,
}

fn default_snapshot_ttl() -> u64 {
    300
}

/// Authentication configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret for user identity tokens
    pub jwt_secret: String,

    /// JWT token expiration in minutes
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_minutes: i64,

    /// Lifetime of minted transport room tokens in seconds
    #[serde(default = "default_room_token_ttl")]
    pub room_token_ttl_secs: i64,
}

fn default_jwt_expiration() -> i64 {
    1440 // 24 hours
}

fn default_room_token_ttl() -> i64 {
    3600
}

/// Payment gateway configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Gateway API base URL
    #[serde(default = "default_gateway_url")]
    pub base_url: String,

    /// API key id
    pub key_id: String,

    /// API key secret
    pub key_secret: String,

    /// Shared secret for webhook signature verification
    pub webhook_secret: String,

    /// Order currency (ISO 4217)
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_gateway_url() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

/// Billing-specific configuration
///
/// Mirrors [`RatePolicy`]; kept as plain numbers so it can be set from
/// environment variables and config files.
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Token cost per billed call minute
    #[serde(default = "default_call_tokens_per_minute")]
    pub call_tokens_per_minute: f64,

    /// Token cost per chat message
    #[serde(default = "default_chat_tokens_per_message")]
    pub chat_tokens_per_message: f64,

    /// Calls at or below this duration are not billed
    #[serde(default = "default_min_billable_call_secs")]
    pub min_billable_call_secs: i64,

    /// Hard ceiling for call sessions in seconds
    #[serde(default = "default_call_session_cap")]
    pub call_session_cap_secs: u32,

    /// Hard ceiling for chat sessions in seconds
    #[serde(default = "default_chat_session_cap")]
    pub chat_session_cap_secs: u32,

    /// Plan validity window in days
    #[serde(default = "default_plan_validity_days")]
    pub plan_validity_days: i64,

    /// Free message grant on signup
    #[serde(default = "default_signup_free_messages")]
    pub signup_free_messages: i32,

    /// Character cap per free-trial message
    #[serde(default = "default_free_trial_char_limit")]
    pub free_trial_char_limit: usize,
}

fn default_call_tokens_per_minute() -> f64 {
    2.0
}

fn default_chat_tokens_per_message() -> f64 {
    0.5
}

fn default_min_billable_call_secs() -> i64 {
    5
}

fn default_call_session_cap() -> u32 {
    3600
}

fn default_chat_session_cap() -> u32 {
    10800
}

fn default_plan_validity_days() -> i64 {
    30
}

fn default_signup_free_messages() -> i32 {
    5
}

fn default_free_trial_char_limit() -> usize {
    75
}

impl BillingConfig {
    /// Build the rate policy from configuration
    ///
    /// Falls back to the canonical defaults for any rate that does not
    /// survive the float-to-decimal conversion.
    pub fn rate_policy(&self) -> RatePolicy {
        let defaults = RatePolicy::default();
        RatePolicy {
            call_tokens_per_minute: Decimal::from_f64_retain(self.call_tokens_per_minute)
                .unwrap_or(defaults.call_tokens_per_minute),
            chat_tokens_per_message: Decimal::from_f64_retain(self.chat_tokens_per_message)
                .unwrap_or(defaults.chat_tokens_per_message),
            min_billable_call_secs: self.min_billable_call_secs,
            call_session_cap_secs: self.call_session_cap_secs,
            chat_session_cap_secs: self.chat_session_cap_secs,
            plan_validity_days: self.plan_validity_days,
            signup_free_messages: self.signup_free_messages,
            free_trial_char_limit: self.free_trial_char_limit,
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            call_tokens_per_minute: 2.0,
            chat_tokens_per_message: 0.5,
            min_billable_call_secs: 5,
            call_session_cap_secs: 3600,
            chat_session_cap_secs: 10800,
            plan_validity_days: 30,
            signup_free_messages: 5,
            free_trial_char_limit: 75,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("redis.snapshot_ttl_secs", 300)?
            .set_default("auth.jwt_expiration_minutes", 1440)?
            .set_default("auth.room_token_ttl_secs", 3600)?
            .set_default("billing.call_tokens_per_minute", 2.0)?
            .set_default("billing.chat_tokens_per_message", 0.5)?
            .set_default("billing.min_billable_call_secs", 5)?
            .set_default("billing.call_session_cap_secs", 3600)?
            .set_default("billing.chat_session_cap_secs", 10800)?
            .set_default("billing.plan_validity_days", 30)?
            .set_default("billing.signup_free_messages", 5)?
            .set_default("billing.free_trial_char_limit", 75)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with SOLACE_ prefix
            .add_source(
                Environment::with_prefix("SOLACE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_billing_config() {
        let config = BillingConfig::default();
        assert_eq!(config.plan_validity_days, 30);
        assert_eq!(config.signup_free_messages, 5);
    }

    #[test]
    fn test_rate_policy_conversion() {
        let policy = BillingConfig::default().rate_policy();
        assert_eq!(policy.call_tokens_per_minute, dec!(2));
        assert_eq!(policy.chat_tokens_per_message, dec!(0.5));
        assert_eq!(policy.chat_session_cap_secs, 10800);
    }
}
