//! Bot API delivery adapter (teloxide).
//!
//! Alternative to delivering through the user account: matches are sent by a
//! bot to a chat it can write to. The target is a numeric chat id or a
//! `@channel` username.

use std::future::{Future, IntoFuture};

use async_trait::async_trait;
use teloxide::{prelude::*, types::Recipient as TgRecipient};
use tokio::time::sleep;
use tracing::{debug, warn};

use tgcp_core::{
    domain::{ChatInfo, ChatMessage, Recipient},
    errors::Error,
    formatting::relay_text,
    ports::DeliveryPort,
    Result,
};

#[derive(Clone)]
pub struct BotDelivery {
    bot: Bot,
}

impl BotDelivery {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }
}

fn map_err(e: teloxide::RequestError) -> Error {
    Error::External(format!("telegram bot error: {e}"))
}

/// Run `op`, retrying once when Telegram asks to back off.
async fn with_retry<T, Fut>(mut op: impl FnMut() -> Fut) -> Result<T>
where
    Fut: IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
    Fut::IntoFuture: Send,
{
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => match e {
                teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                    continue;
                }
                other => return Err(map_err(other)),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivered {
    Forwarded,
    Relayed,
}

/// Await `forward`; if it fails, send the copy produced by `relay` instead.
async fn forward_or_relay<F, R, RFut>(forward: F, relay: R) -> Result<Delivered>
where
    F: Future<Output = Result<()>>,
    R: FnOnce() -> RFut,
    RFut: Future<Output = Result<()>>,
{
    match forward.await {
        Ok(()) => Ok(Delivered::Forwarded),
        Err(e) => {
            // Bots can only forward from chats they can read.
            debug!("forward failed ({e}); relaying text");
            relay().await?;
            Ok(Delivered::Relayed)
        }
    }
}

/// Numeric ids address any chat; anything else is treated as a public `@username`.
fn tg_recipient(handle: &str) -> TgRecipient {
    let handle = handle.trim();
    match handle.parse::<i64>() {
        Ok(id) => TgRecipient::Id(teloxide::types::ChatId(id)),
        Err(_) => TgRecipient::ChannelUsername(format!("@{}", handle.trim_start_matches('@'))),
    }
}

#[async_trait]
impl DeliveryPort for BotDelivery {
    async fn resolve_target(&self, handle: &str) -> Result<Option<Recipient>> {
        let chat = match with_retry(|| self.bot.get_chat(tg_recipient(handle))).await {
            Ok(chat) => chat,
            Err(e) => {
                warn!("bot cannot access chat `{handle}`: {e}");
                return Ok(None);
            }
        };

        let display_name = chat
            .title()
            .or_else(|| chat.first_name())
            .or_else(|| chat.username())
            .unwrap_or(handle)
            .to_string();

        Ok(Some(Recipient {
            handle: handle.to_string(),
            display_name,
        }))
    }

    async fn send_text(&self, to: &Recipient, text: &str) -> Result<()> {
        with_retry(|| self.bot.send_message(tg_recipient(&to.handle), text.to_string())).await?;
        Ok(())
    }

    async fn forward(
        &self,
        to: &Recipient,
        source: &ChatInfo,
        message: &ChatMessage,
    ) -> Result<()> {
        let copy = relay_text(source, message);
        let delivered = forward_or_relay(
            async {
                with_retry(|| {
                    self.bot.forward_message(
                        tg_recipient(&to.handle),
                        tg_recipient(&source.handle),
                        teloxide::types::MessageId(message.id),
                    )
                })
                .await
                .map(|_| ())
            },
            || self.send_text(to, &copy),
        )
        .await?;
        debug!("message {} delivered: {delivered:?}", message.id);
        Ok(())
    }
}
