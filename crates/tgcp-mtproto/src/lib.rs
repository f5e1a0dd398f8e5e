//! MTProto adapter (grammers).
//!
//! Logs in as a regular user account, so it can read channel/group history and
//! forward messages as that user. Implements every `tgcp-core` port.

use std::{collections::HashMap, path::PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grammers_client::{
    types::{Chat, LoginToken, PasswordToken, User},
    Client, Config as ClientConfig, InitParams, SignInError,
};
use grammers_session::{PackedChat, Session};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use tgcp_core::{
    config::Credentials,
    domain::{Account, ChatInfo, ChatMessage, Recipient, Sender},
    errors::Error,
    ports::{DeliveryPort, HistoryPort, SessionPort, SignIn},
    Result,
};

/// A Telegram user-account client backed by a session file.
pub struct MtprotoClient {
    creds: Credentials,
    session_file: PathBuf,
    client: Mutex<Option<Client>>,
    login: Mutex<LoginState>,
    peers: Mutex<HashMap<String, PackedChat>>,
}

#[derive(Default)]
struct LoginState {
    token: Option<LoginToken>,
    password: Option<PasswordToken>,
}

impl MtprotoClient {
    pub fn new(creds: Credentials, session_file: PathBuf) -> Self {
        Self {
            creds,
            session_file,
            client: Mutex::new(None),
            login: Mutex::new(LoginState::default()),
            peers: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self) -> Result<Client> {
        self.client
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::External("telegram client is not connected".to_string()))
    }

    async fn save_session(&self, client: &Client) -> Result<()> {
        if let Some(parent) = self.session_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        client.session().save_to_file(&self.session_file)?;
        Ok(())
    }

    async fn remember(&self, handle: &str, chat: &Chat) {
        self.peers
            .lock()
            .await
            .insert(handle.to_string(), chat.pack());
    }

    async fn packed(&self, handle: &str) -> Result<PackedChat> {
        if let Some(packed) = self.peers.lock().await.get(handle).copied() {
            return Ok(packed);
        }
        let client = self.client().await?;
        let chat = self
            .lookup(&client, handle)
            .await?
            .ok_or_else(|| Error::External(format!("unknown peer `{handle}`")))?;
        Ok(chat.pack())
    }

    /// Resolve a username (or `me` for Saved Messages) and cache the peer.
    async fn lookup(&self, client: &Client, handle: &str) -> Result<Option<Chat>> {
        let chat = if is_self_handle(handle) {
            Some(Chat::User(client.get_me().await.map_err(map_err)?))
        } else {
            client.resolve_username(handle).await.map_err(map_err)?
        };
        if let Some(chat) = &chat {
            self.remember(handle, chat).await;
        }
        Ok(chat)
    }
}

fn is_self_handle(handle: &str) -> bool {
    handle.eq_ignore_ascii_case("me") || handle.eq_ignore_ascii_case("self")
}

fn map_err(e: impl std::fmt::Display) -> Error {
    Error::External(format!("telegram error: {e}"))
}

fn account(user: &User) -> Account {
    Account {
        first_name: user.first_name().to_string(),
        last_name: user.last_name().map(str::to_string),
        username: user.username().map(str::to_string),
        phone: user.phone().map(str::to_string),
    }
}

fn sender(chat: &Chat) -> Sender {
    match chat {
        Chat::User(user) => Sender::User {
            first_name: Some(user.first_name().to_string()),
            last_name: user.last_name().map(str::to_string),
        },
        Chat::Group(_) | Chat::Channel(_) => Sender::Titled {
            title: chat.name().to_string(),
        },
    }
}

#[async_trait]
impl SessionPort for MtprotoClient {
    async fn connect(&self) -> Result<()> {
        let mut guard = self.client.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let session = Session::load_file_or_create(&self.session_file)?;
        let client = Client::connect(ClientConfig {
            session,
            api_id: self.creds.api_id,
            api_hash: self.creds.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(map_err)?;

        debug!("connected to telegram");
        *guard = Some(client);
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(client) = self.client.lock().await.take() else {
            return;
        };
        if let Err(e) = self.save_session(&client).await {
            warn!(
                "failed to save session {}: {e}",
                self.session_file.display()
            );
        }
        drop(client);
        debug!("disconnected from telegram");
    }

    async fn is_authorized(&self) -> Result<bool> {
        self.client().await?.is_authorized().await.map_err(map_err)
    }

    async fn request_login_code(&self, phone: &str) -> Result<()> {
        let token = self
            .client()
            .await?
            .request_login_code(phone)
            .await
            .map_err(|e| Error::Auth(e.to_string()))?;
        self.login.lock().await.token = Some(token);
        Ok(())
    }

    async fn sign_in(&self, code: &str) -> Result<SignIn> {
        let client = self.client().await?;
        let token = self
            .login
            .lock()
            .await
            .token
            .take()
            .ok_or_else(|| Error::Auth("no login code was requested".to_string()))?;

        match client.sign_in(&token, code).await {
            Ok(user) => {
                self.save_session(&client).await?;
                Ok(SignIn::Authorized(account(&user)))
            }
            Err(SignInError::PasswordRequired(password)) => {
                let hint = password.hint().map(|h| h.to_string());
                self.login.lock().await.password = Some(password);
                Ok(SignIn::PasswordRequired { hint })
            }
            Err(e) => Err(Error::Auth(e.to_string())),
        }
    }

    async fn check_password(&self, password: &str) -> Result<Account> {
        let client = self.client().await?;
        let token = self
            .login
            .lock()
            .await
            .password
            .take()
            .ok_or_else(|| Error::Auth("no password was requested".to_string()))?;

        let user = client
            .check_password(token, password.trim())
            .await
            .map_err(|e| Error::Auth(e.to_string()))?;
        self.save_session(&client).await?;
        Ok(account(&user))
    }

    async fn me(&self) -> Result<Account> {
        let user = self.client().await?.get_me().await.map_err(map_err)?;
        Ok(account(&user))
    }
}

#[async_trait]
impl HistoryPort for MtprotoClient {
    async fn resolve_chat(&self, handle: &str) -> Result<Option<ChatInfo>> {
        let client = self.client().await?;
        let Some(chat) = self.lookup(&client, handle).await? else {
            return Ok(None);
        };
        Ok(Some(ChatInfo {
            id: chat.id(),
            handle: handle.to_string(),
            title: chat.name().to_string(),
        }))
    }

    async fn messages_since(
        &self,
        chat: &ChatInfo,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>> {
        let client = self.client().await?;
        let packed = self.packed(&chat.handle).await?;

        let mut out = Vec::new();
        let mut iter = client.iter_messages(packed);
        while let Some(message) = iter.next().await.map_err(map_err)? {
            let date = message.date();
            if date < cutoff {
                break;
            }
            out.push(ChatMessage {
                id: message.id(),
                date,
                text: message.text().to_string(),
                sender: message.sender().as_ref().map(sender),
            });
        }
        debug!("read {} messages from {}", out.len(), chat.handle);
        Ok(out)
    }
}

#[async_trait]
impl DeliveryPort for MtprotoClient {
    async fn resolve_target(&self, handle: &str) -> Result<Option<Recipient>> {
        let client = self.client().await?;
        let Some(chat) = self.lookup(&client, handle).await? else {
            return Ok(None);
        };
        Ok(Some(Recipient {
            handle: handle.to_string(),
            display_name: chat.name().to_string(),
        }))
    }

    async fn send_text(&self, to: &Recipient, text: &str) -> Result<()> {
        let client = self.client().await?;
        let packed = self.packed(&to.handle).await?;
        client.send_message(packed, text).await.map_err(map_err)?;
        Ok(())
    }

    async fn forward(
        &self,
        to: &Recipient,
        source: &ChatInfo,
        message: &ChatMessage,
    ) -> Result<()> {
        let client = self.client().await?;
        let destination = self.packed(&to.handle).await?;
        let from = self.packed(&source.handle).await?;

        let forwarded = client
            .forward_messages(destination, &[message.id], from)
            .await
            .map_err(map_err)?;
        if forwarded.iter().all(Option::is_none) {
            return Err(Error::External(format!(
                "telegram did not forward message {}",
                message.id
            )));
        }
        Ok(())
    }
}
