//! Broadcast daemon: drains queued posts to every registered user.
//!
//! Posts move WAIT -> SENDING -> DONE. Delivery is best-effort per user
//! (blocked bots and deleted accounts are routine) with a short pause
//! between sends to stay under Telegram's rate limits.

use std::time::Duration;

use anyhow::Result;
use sqlx::SqlitePool;
use teloxide::prelude::*;
use tracing::{error, info, warn};

use crate::db::{self, Post};
use crate::outbound;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const SEND_PACING: Duration = Duration::from_millis(50);

/// Poll the post queue forever. Queue errors are logged and retried on the
/// next tick rather than killing the task.
pub async fn run(bot: Bot, pool: SqlitePool) {
    let mut tick = tokio::time::interval(POLL_INTERVAL);
    loop {
        tick.tick().await;
        if let Err(e) = process_queue(&bot, &pool).await {
            error!(error = %e, "post queue pass failed");
        }
    }
}

async fn process_queue(bot: &Bot, pool: &SqlitePool) -> Result<()> {
    for post in db::list_queued_posts(pool).await? {
        process_post(bot, pool, &post).await?;
    }
    Ok(())
}

async fn process_post(bot: &Bot, pool: &SqlitePool, post: &Post) -> Result<()> {
    db::mark_post_sending(pool, post.id).await?;
    info!(post_id = post.id, "broadcasting post");

    let mut receivers = 0u32;
    for user_id in db::list_user_ids(pool).await? {
        match outbound::send_post(bot, ChatId(user_id), post).await {
            Ok(()) => receivers += 1,
            Err(e) => warn!(post_id = post.id, user_id, error = %e, "post delivery failed"),
        }
        tokio::time::sleep(SEND_PACING).await;
    }

    db::mark_post_done(pool, post.id, receivers as i64).await?;
    info!(post_id = post.id, receivers, "post broadcast finished");
    Ok(())
}
