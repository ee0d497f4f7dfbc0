//! Runtime configuration, collected from the environment once at startup
//! and passed down explicitly.

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub database_url: String,
    /// Chat ids that receive new-order notifications and failure reports.
    pub admin_chat_ids: Vec<i64>,
    /// Global service fee percentage, unless the user carries an override.
    pub default_service_fee: f64,
    pub payment_api_key: Option<String>,
    /// Public URL the payment provider calls back on.
    pub payment_callback_url: String,
    /// Shared secret required on webhook requests when set.
    pub payment_ipn_secret: Option<String>,
    pub support_url: Option<String>,
    /// Bind address for the payment webhook server.
    pub webhook_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bot_token =
            env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let admin_chat_ids = env::var("ADMIN_CHAT_IDS")
            .unwrap_or_default()
            .split_whitespace()
            .map(|id| id.parse::<i64>().with_context(|| format!("bad admin chat id: {id}")))
            .collect::<Result<Vec<_>>>()?;

        let default_service_fee = match env::var("SERVICE_FEE") {
            Ok(fee) => fee.parse::<f64>().context("SERVICE_FEE must be a number")?,
            Err(_) => 1.0,
        };

        let webhook_addr = env::var("WEBHOOK_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("WEBHOOK_ADDR must be a socket address")?;

        Ok(Self {
            bot_token,
            database_url,
            admin_chat_ids,
            default_service_fee,
            payment_api_key: env::var("PAYMENT_API_KEY").ok(),
            payment_callback_url: env::var("PAYMENT_CALLBACK_URL").unwrap_or_default(),
            payment_ipn_secret: env::var("PAYMENT_IPN_SECRET").ok(),
            support_url: env::var("SUPPORT_URL").ok(),
            webhook_addr,
        })
    }
}
