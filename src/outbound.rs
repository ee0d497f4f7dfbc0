//! Thin send helpers over the Telegram API.
//!
//! Everything user-facing goes out as HTML through these wrappers so parse
//! mode and markup handling live in one place.

use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::types::{
    FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, LinkPreviewOptions, MessageId,
    ParseMode, ReplyMarkup,
};
use tracing::warn;

use crate::db::Post;

pub async fn send_text(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    markup: Option<ReplyMarkup>,
) -> Result<Message> {
    let mut req = bot.send_message(chat_id, text).parse_mode(ParseMode::Html);
    if let Some(markup) = markup {
        req = req.reply_markup(markup);
    }
    req.await.context("failed to send message")
}

pub async fn edit_text(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    text: &str,
    markup: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    let mut req = bot
        .edit_message_text(chat_id, message_id, text)
        .parse_mode(ParseMode::Html);
    if let Some(markup) = markup {
        req = req.reply_markup(markup);
    }
    req.await.context("failed to edit message")?;
    Ok(())
}

fn post_button(post: &Post) -> Option<InlineKeyboardMarkup> {
    let label = post.button.as_deref()?;
    let link = post.link.as_deref()?;
    match link.parse() {
        Ok(url) => Some(InlineKeyboardMarkup::new([[InlineKeyboardButton::url(label, url)]])),
        Err(e) => {
            warn!(post_id = post.id, link, error = %e, "post button link is not a url");
            None
        }
    }
}

fn preview_disabled() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

/// Attached media of a broadcast post, ready to send. A post carrying
/// both ids goes out as the photo.
#[derive(Debug)]
enum PostMedia {
    Photo(InputFile),
    Gif(InputFile),
}

fn post_media(post: &Post) -> Option<PostMedia> {
    if let Some(photo_id) = &post.photo_id {
        return Some(PostMedia::Photo(InputFile::file_id(FileId(photo_id.clone()))));
    }
    if let Some(gif_id) = &post.gif_id {
        return Some(PostMedia::Gif(InputFile::file_id(FileId(gif_id.clone()))));
    }
    None
}

/// Deliver a broadcast post to one chat.
///
/// Posts with a photo or gif go out as media with the text as caption. If
/// Telegram rejects the media (expired file id, chat restrictions) the text
/// is retried on its own once before giving up.
pub async fn send_post(bot: &Bot, chat_id: ChatId, post: &Post) -> Result<()> {
    let markup = post_button(post);

    let media_result = match post_media(post) {
        Some(PostMedia::Photo(photo)) => {
            let mut req = bot
                .send_photo(chat_id, photo)
                .caption(&post.message)
                .parse_mode(ParseMode::Html);
            if let Some(markup) = markup.clone() {
                req = req.reply_markup(markup);
            }
            Some(req.await)
        }
        Some(PostMedia::Gif(gif)) => {
            let mut req = bot
                .send_animation(chat_id, gif)
                .caption(&post.message)
                .parse_mode(ParseMode::Html);
            if let Some(markup) = markup.clone() {
                req = req.reply_markup(markup);
            }
            Some(req.await)
        }
        None => None,
    };

    match media_result {
        Some(Ok(_)) => Ok(()),
        Some(Err(e)) => {
            warn!(chat_id = chat_id.0, post_id = post.id, error = %e,
                "post media rejected, retrying as text");
            send_post_text(bot, chat_id, post, markup).await
        }
        None => send_post_text(bot, chat_id, post, markup).await,
    }
}

async fn send_post_text(
    bot: &Bot,
    chat_id: ChatId,
    post: &Post,
    markup: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    let mut req = bot
        .send_message(chat_id, &post.message)
        .parse_mode(ParseMode::Html);
    if !post.preview {
        req = req.link_preview_options(preview_disabled());
    }
    if let Some(markup) = markup {
        req = req.reply_markup(markup);
    }
    req.await.context("failed to send post text")?;
    Ok(())
}

/// Send the same message to every admin chat. Individual failures are
/// logged and skipped so one unreachable admin does not mute the rest.
pub async fn broadcast_to_admins(bot: &Bot, admin_chat_ids: &[i64], text: &str) {
    for &chat_id in admin_chat_ids {
        if let Err(e) = send_text(bot, ChatId(chat_id), text, None).await {
            warn!(chat_id, error = %e, "failed to notify admin");
        }
    }
}

/// Report an operational failure to the admins. Best-effort by design of
/// the callers: this runs on error paths that must not themselves fail.
pub async fn report_failure(bot: &Bot, admin_chat_ids: &[i64], context: &str, error: &str) {
    let text = crate::texts::admin_failure(context, error);
    broadcast_to_admins(bot, admin_chat_ids, &text).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(photo_id: Option<&str>, gif_id: Option<&str>) -> Post {
        Post {
            id: 1,
            created: Utc::now(),
            status: crate::db::POST_WAIT.to_string(),
            photo_id: photo_id.map(str::to_string),
            gif_id: gif_id.map(str::to_string),
            message: "hello".to_string(),
            preview: false,
            button: None,
            link: None,
            receivers: None,
        }
    }

    #[test]
    fn test_post_media_builds_from_file_ids() {
        assert!(matches!(post_media(&post(Some("ph1"), None)), Some(PostMedia::Photo(_))));
        assert!(matches!(post_media(&post(None, Some("gf1"))), Some(PostMedia::Gif(_))));
        assert!(post_media(&post(None, None)).is_none());
        // Photo wins when both are set.
        assert!(matches!(post_media(&post(Some("ph1"), Some("gf1"))), Some(PostMedia::Photo(_))));
    }

    #[test]
    fn test_post_button_requires_label_link_pair() {
        let mut p = post(None, None);
        assert!(post_button(&p).is_none());

        p.button = Some("Open".to_string());
        assert!(post_button(&p).is_none());

        p.link = Some("not a url".to_string());
        assert!(post_button(&p).is_none());

        p.link = Some("https://example.com/sale".to_string());
        let markup = post_button(&p).expect("button renders");
        assert_eq!(markup.inline_keyboard[0][0].text, "Open");
    }
}
