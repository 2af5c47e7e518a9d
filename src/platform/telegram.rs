use std::sync::Arc;

use anyhow::Result;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, Document, InputFile, ParseMode};
use tracing::{error, info, warn};

use crate::platform::{IncomingMessage, MessageContent, Reply, ReplyFormat};
use crate::router::{check_upload, parse_route, render, Router};

/// The bot's own @username, used to accept `/cmd@bot` in groups.
#[derive(Clone, Debug)]
struct BotUsername(Option<String>);

/// Run the Telegram bot platform
pub async fn run(router: Arc<Router>, bot: Bot) -> Result<()> {
    info!("Starting Telegram platform...");

    if let Err(e) = bot.set_my_commands(router.bot_commands()).await {
        warn!("Failed to register command menu: {}", e);
    }

    let username = match bot.get_me().await {
        Ok(me) => me.user.username.clone(),
        Err(e) => {
            warn!("Failed to fetch bot identity: {}", e);
            None
        }
    };
    info!("Bot username: {:?}", username);

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router, BotUsername(username)])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    router: Arc<Router>,
    username: BotUsername,
) -> ResponseResult<()> {
    if let Err(e) = process_message(&bot, &msg, &router, username.0.as_deref()).await {
        error!("Error processing message: {:#}", e);
        bot.send_message(
            msg.chat.id,
            "⚠️ Something went wrong while processing your message.",
        )
        .await
        .ok();
    }
    Ok(())
}

async fn process_message(
    bot: &Bot,
    msg: &Message,
    router: &Router,
    username: Option<&str>,
) -> Result<()> {
    let user = match msg.from.as_ref() {
        Some(user) => user,
        None => return Ok(()),
    };

    let content = if let Some(doc) = msg.document() {
        if let Err(rejection) =
            check_upload(doc.file_name.as_deref(), u64::from(doc.file.size))
        {
            info!("Rejected upload {:?}: {:?}", doc.file_name, rejection);
            bot.send_message(msg.chat.id, rejection.to_string()).await?;
            return Ok(());
        }
        MessageContent::Document {
            file_name: doc.file_name.clone(),
            bytes: download_document(bot, doc).await?,
        }
    } else if let Some(text) = msg.text() {
        MessageContent::Text(text.to_string())
    } else {
        return Ok(());
    };

    let incoming = IncomingMessage {
        chat_id: msg.chat.id.0.to_string(),
        user_id: user.id.0.to_string(),
        user_name: user.first_name.clone(),
        content,
    };

    match &incoming.content {
        MessageContent::Text(text) => info!(
            "Telegram message from {} ({}) in {}: {}",
            incoming.user_name, incoming.user_id, incoming.chat_id, text
        ),
        MessageContent::Document { file_name, bytes } => info!(
            "Telegram file from {} ({}) in {}: {:?} ({} bytes)",
            incoming.user_name,
            incoming.user_id,
            incoming.chat_id,
            file_name,
            bytes.len()
        ),
    }

    let reply = match incoming.content {
        MessageContent::Text(text) => {
            let route = parse_route(&text, username);
            if route.is_slow() {
                send_typing(bot, msg.chat.id).await;
            }
            router.handle_route(route).await
        }
        MessageContent::Document { file_name, bytes } => {
            send_typing(bot, msg.chat.id).await;
            router.handle_document(file_name.as_deref(), &bytes).await
        }
    };
    send_reply(bot, msg.chat.id, &reply).await
}

async fn send_typing(bot: &Bot, chat_id: ChatId) {
    bot.send_chat_action(chat_id, ChatAction::Typing).await.ok();
}

async fn download_document(bot: &Bot, doc: &Document) -> Result<Vec<u8>> {
    let file = bot.get_file(doc.file.id.clone()).await?;
    let mut bytes = Vec::with_capacity(file.size as usize);
    bot.download_file(&file.path, &mut bytes).await?;
    Ok(bytes)
}

/// Send every chunk of `reply`. A formatted chunk Telegram refuses (a split
/// may cut through a tag) is resent as plain text.
async fn send_reply(bot: &Bot, chat_id: ChatId, reply: &Reply) -> Result<()> {
    for part in render(reply) {
        match reply.format {
            ReplyFormat::Html => {
                let sent = bot
                    .send_message(chat_id, part.clone())
                    .parse_mode(ParseMode::Html)
                    .await;
                if let Err(e) = sent {
                    warn!("HTML reply rejected, resending as plain text: {}", e);
                    bot.send_message(chat_id, part).await?;
                }
            }
            ReplyFormat::Plain => {
                bot.send_message(chat_id, part).await?;
            }
        }
    }

    if let Some(attachment) = &reply.attachment {
        let file = InputFile::memory(attachment.content.clone())
            .file_name(attachment.file_name.clone());
        if let Err(e) = bot.send_document(chat_id, file).await {
            warn!("Failed to send result file {}: {}", attachment.file_name, e);
        }
    }

    Ok(())
}
