use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use orderdesk::config::Config;
use orderdesk::payment::{self, WebhookState};
use orderdesk::registry::UserGate;
use orderdesk::{bot, db, sender};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting orderdesk bot");

    let cfg = Arc::new(Config::from_env()?);
    if cfg.payment_ipn_secret.is_none() {
        warn!("PAYMENT_IPN_SECRET is not set; payment webhook accepts unauthenticated notices");
    }

    let pool = db::connect(&cfg.database_url).await?;
    db::init_schema(&pool).await?;

    let bot = Bot::new(&cfg.bot_token);

    tokio::spawn(sender::run(bot.clone(), pool.clone()));

    let webhook = payment::router(WebhookState {
        bot: bot.clone(),
        pool: pool.clone(),
        cfg: cfg.clone(),
    });
    let listener = tokio::net::TcpListener::bind(cfg.webhook_addr)
        .await
        .with_context(|| format!("failed to bind webhook address {}", cfg.webhook_addr))?;
    info!(addr = %cfg.webhook_addr, "payment webhook listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, webhook).await {
            error!(error = %e, "payment webhook server failed");
        }
    });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(bot::message_handler::handle))
        .branch(Update::filter_callback_query().endpoint(bot::callback_handler::handle));

    info!("starting dispatcher");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![pool, cfg, UserGate::new()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
