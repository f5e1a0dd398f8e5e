use chrono::{DateTime, Utc};

/// A resolved source chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: i64,
    /// Public username without the leading `@`.
    pub handle: String,
    pub title: String,
}

/// A resolved delivery target.
///
/// `handle` is whatever the delivery adapter understands (username or numeric id).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    pub handle: String,
    pub display_name: String,
}

/// Author of a chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sender {
    User {
        first_name: Option<String>,
        last_name: Option<String>,
    },
    /// Groups and channels posting as themselves.
    Titled { title: String },
}

/// A message read from the source chat history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: i32,
    pub date: DateTime<Utc>,
    pub text: String,
    pub sender: Option<Sender>,
}

impl ChatMessage {
    pub fn sender_name(&self) -> String {
        sender_name(self.sender.as_ref())
    }
}

/// The logged-in Telegram account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
}

impl Account {
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name,
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

pub fn sender_name(sender: Option<&Sender>) -> String {
    let name = match sender {
        Some(Sender::User {
            first_name,
            last_name,
        }) => {
            let mut parts = vec![first_name.as_deref().unwrap_or_default()];
            if let Some(last) = last_name.as_deref().filter(|s| !s.is_empty()) {
                parts.push(last);
            }
            parts.join(" ").trim().to_string()
        }
        Some(Sender::Titled { title }) => title.trim().to_string(),
        None => String::new(),
    };

    if name.is_empty() {
        "Unknown".to_string()
    } else {
        name
    }
}

/// Strip `@` and `t.me` prefixes from a chat or user handle.
pub fn normalize_handle(raw: &str) -> String {
    let s = raw.trim();
    let s = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
        .unwrap_or(s);
    let s = s
        .strip_prefix("t.me/")
        .or_else(|| s.strip_prefix("telegram.me/"))
        .unwrap_or(s);
    s.trim_start_matches('@').trim_end_matches('/').to_string()
}
