use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use sqlx::SqlitePool;
use teloxide::types::CallbackQuery;
use teloxide::Bot;

use orderdesk::bot::callback_handler;
use orderdesk::config::Config;
use orderdesk::db;
use orderdesk::registry::UserGate;

fn test_config() -> Config {
    Config {
        bot_token: "123456:TEST".to_string(),
        database_url: "sqlite::memory:".to_string(),
        admin_chat_ids: Vec::new(),
        default_service_fee: 1.0,
        payment_api_key: None,
        payment_callback_url: String::new(),
        payment_ipn_secret: None,
        support_url: None,
        webhook_addr: "127.0.0.1:0".parse().expect("static addr"),
    }
}

async fn setup_db() -> Result<SqlitePool> {
    let pool = db::connect_with_pool_size("sqlite::memory:", 1).await?;
    db::init_schema(&pool).await?;
    Ok(pool)
}

/// Build a callback query the way Telegram delivers it.
fn callback_query(user_id: i64, data: Option<&str>) -> CallbackQuery {
    let mut value = json!({
        "id": "query-1",
        "from": { "id": user_id, "is_bot": false, "first_name": "Test" },
        "chat_instance": "instance-1",
    });
    if let Some(data) = data {
        value["data"] = json!(data);
    }
    serde_json::from_value(value).expect("well-formed callback query")
}

async fn log_count(pool: &SqlitePool, user_id: i64) -> Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM logs WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await?,
    )
}

#[tokio::test]
async fn test_banned_user_press_gets_no_acknowledgement() -> Result<()> {
    let pool = setup_db().await?;
    db::create_user(&pool, 50, Some("banned"), Some("B"), None).await?;
    sqlx::query("UPDATE users SET is_banned = 1 WHERE user_id = 50")
        .execute(&pool)
        .await?;

    let bot = Bot::new(&test_config().bot_token);
    let cfg = Arc::new(test_config());
    let q = callback_query(50, Some("@&7&null"));

    let acknowledge = callback_handler::process(&bot, &q, &pool, &cfg, &UserGate::new()).await?;
    assert!(!acknowledge);

    // Nothing was recorded either: the press left no trace.
    assert_eq!(log_count(&pool, 50).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_undecodable_token_is_audited_then_acknowledged() -> Result<()> {
    let pool = setup_db().await?;
    let bot = Bot::new(&test_config().bot_token);
    let cfg = Arc::new(test_config());
    let q = callback_query(51, Some("stale-token-from-old-build"));

    let acknowledge = callback_handler::process(&bot, &q, &pool, &cfg, &UserGate::new()).await?;
    assert!(acknowledge);

    // First contact registers the user; the press is audited under the raw
    // token since no keyboard is attached to resolve a label from.
    assert!(db::get_user(&pool, 51).await?.is_some());
    assert_eq!(log_count(&pool, 51).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_query_without_data_is_acknowledged_silently() -> Result<()> {
    let pool = setup_db().await?;
    let bot = Bot::new(&test_config().bot_token);
    let cfg = Arc::new(test_config());
    let q = callback_query(52, None);

    let acknowledge = callback_handler::process(&bot, &q, &pool, &cfg, &UserGate::new()).await?;
    assert!(acknowledge);
    assert_eq!(log_count(&pool, 52).await?, 0);
    Ok(())
}
