//! In-memory Telegram used by unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{
    domain::{Account, ChatInfo, ChatMessage, Recipient, Sender},
    ports::{DeliveryPort, HistoryPort, Prompt, SessionPort, SignIn},
    Error, Result,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { to: String, text: String },
    Forward { to: String, message_id: i32 },
}

#[derive(Default)]
pub struct FakeTelegram {
    pub authorized: Mutex<bool>,
    pub password: Option<String>,
    pub fail_connect: bool,
    pub chats: HashMap<String, ChatInfo>,
    pub targets: HashMap<String, Recipient>,
    /// Newest first, like the real history API.
    pub history: Vec<ChatMessage>,
    pub fail_forward_for: HashSet<i32>,

    pub connects: Mutex<usize>,
    pub disconnects: Mutex<usize>,
    pub code_requests: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<Sent>>,
}

impl FakeTelegram {
    pub fn with_market(history: Vec<ChatMessage>) -> Self {
        let mut chats = HashMap::new();
        chats.insert(
            "market".to_string(),
            ChatInfo {
                id: -100,
                handle: "market".to_string(),
                title: "Flea Market".to_string(),
            },
        );
        let mut targets = HashMap::new();
        targets.insert(
            "me".to_string(),
            Recipient {
                handle: "me".to_string(),
                display_name: "Me".to_string(),
            },
        );
        Self {
            authorized: Mutex::new(true),
            chats,
            targets,
            history,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn forwarded_ids(&self) -> Vec<i32> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Forward { message_id, .. } => Some(message_id),
                Sent::Text { .. } => None,
            })
            .collect()
    }

    pub fn connects(&self) -> usize {
        *self.connects.lock().unwrap()
    }

    pub fn disconnects(&self) -> usize {
        *self.disconnects.lock().unwrap()
    }

    fn account() -> Account {
        Account {
            first_name: "Test".to_string(),
            last_name: Some("User".to_string()),
            username: Some("tester".to_string()),
            phone: Some("10000000000".to_string()),
        }
    }
}

pub fn message(id: i32, minutes_ago: i64, text: &str) -> ChatMessage {
    ChatMessage {
        id,
        date: Utc::now() - Duration::minutes(minutes_ago),
        text: text.to_string(),
        sender: Some(Sender::User {
            first_name: Some("Seller".to_string()),
            last_name: None,
        }),
    }
}

#[async_trait]
impl SessionPort for FakeTelegram {
    async fn connect(&self) -> Result<()> {
        *self.connects.lock().unwrap() += 1;
        if self.fail_connect {
            return Err(Error::External("network unreachable".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&self) {
        *self.disconnects.lock().unwrap() += 1;
    }

    async fn is_authorized(&self) -> Result<bool> {
        Ok(*self.authorized.lock().unwrap())
    }

    async fn request_login_code(&self, phone: &str) -> Result<()> {
        self.code_requests.lock().unwrap().push(phone.to_string());
        Ok(())
    }

    async fn sign_in(&self, code: &str) -> Result<SignIn> {
        if code != "12345" {
            return Err(Error::Auth("PHONE_CODE_INVALID".to_string()));
        }
        if self.password.is_some() {
            return Ok(SignIn::PasswordRequired {
                hint: Some("pet name".to_string()),
            });
        }
        *self.authorized.lock().unwrap() = true;
        Ok(SignIn::Authorized(Self::account()))
    }

    async fn check_password(&self, password: &str) -> Result<Account> {
        if self.password.as_deref() != Some(password) {
            return Err(Error::Auth("PASSWORD_HASH_INVALID".to_string()));
        }
        *self.authorized.lock().unwrap() = true;
        Ok(Self::account())
    }

    async fn me(&self) -> Result<Account> {
        Ok(Self::account())
    }
}

#[async_trait]
impl HistoryPort for FakeTelegram {
    async fn resolve_chat(&self, handle: &str) -> Result<Option<ChatInfo>> {
        Ok(self.chats.get(handle).cloned())
    }

    async fn messages_since(
        &self,
        _chat: &ChatInfo,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>> {
        Ok(self
            .history
            .iter()
            .take_while(|m| m.date >= cutoff)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DeliveryPort for FakeTelegram {
    async fn resolve_target(&self, handle: &str) -> Result<Option<Recipient>> {
        Ok(self.targets.get(handle).cloned())
    }

    async fn send_text(&self, to: &Recipient, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Text {
            to: to.handle.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn forward(
        &self,
        to: &Recipient,
        _source: &ChatInfo,
        message: &ChatMessage,
    ) -> Result<()> {
        if self.fail_forward_for.contains(&message.id) {
            return Err(Error::External("CHAT_FORWARDS_RESTRICTED".to_string()));
        }
        self.sent.lock().unwrap().push(Sent::Forward {
            to: to.handle.clone(),
            message_id: message.id,
        });
        Ok(())
    }
}

/// Answers prompts from a fixed script.
pub struct ScriptedPrompt {
    answers: Mutex<Vec<String>>,
    pub asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().rev().map(|s| s.to_string()).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn ask(&self, question: &str) -> Result<String> {
        self.asked.lock().unwrap().push(question.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| Error::Auth("no scripted answer left".to_string()))
    }
}
