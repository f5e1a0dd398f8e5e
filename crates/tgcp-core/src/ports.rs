use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin},
    sync::Mutex,
};

use crate::{
    domain::{Account, ChatInfo, ChatMessage, Recipient},
    Error, Result,
};

/// Result of submitting a login code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignIn {
    Authorized(Account),
    /// The account has 2FA enabled; call `check_password` next.
    PasswordRequired { hint: Option<String> },
}

/// Connection + authorization of the Telegram user account.
///
/// Login state between `request_login_code`, `sign_in` and `check_password`
/// is kept by the adapter.
#[async_trait]
pub trait SessionPort: Send + Sync {
    async fn connect(&self) -> Result<()>;

    /// Persist the session and drop the connection. Never fails the caller.
    async fn disconnect(&self);

    async fn is_authorized(&self) -> Result<bool>;
    async fn request_login_code(&self, phone: &str) -> Result<()>;
    async fn sign_in(&self, code: &str) -> Result<SignIn>;
    async fn check_password(&self, password: &str) -> Result<Account>;
    async fn me(&self) -> Result<Account>;
}

/// Read access to chat history.
#[async_trait]
pub trait HistoryPort: Send + Sync {
    async fn resolve_chat(&self, handle: &str) -> Result<Option<ChatInfo>>;

    /// Messages newest first, stopping at the first one older than `cutoff`.
    async fn messages_since(
        &self,
        chat: &ChatInfo,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>>;
}

/// Where keyword matches end up.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    async fn resolve_target(&self, handle: &str) -> Result<Option<Recipient>>;
    async fn send_text(&self, to: &Recipient, text: &str) -> Result<()>;
    async fn forward(&self, to: &Recipient, source: &ChatInfo, message: &ChatMessage)
        -> Result<()>;
}

/// Interactive input during login.
#[async_trait]
pub trait Prompt: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String>;

    async fn ask_secret(&self, question: &str) -> Result<String> {
        self.ask(question).await
    }
}

/// Answers read line by line from one buffered input.
///
/// The reader lives as long as the prompt, so input buffered past the first
/// line is still there for the next question.
pub struct LinePrompt<R> {
    input: Mutex<R>,
}

/// Prompt that reads from the process's stdin.
pub type StdinPrompt = LinePrompt<BufReader<Stdin>>;

impl<R> LinePrompt<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }
}

impl LinePrompt<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> Prompt for LinePrompt<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn ask(&self, question: &str) -> Result<String> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(question.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        let n = self.input.lock().await.read_line(&mut line).await?;
        if n == 0 {
            return Err(Error::Auth("stdin closed before an answer was given".to_string()));
        }
        Ok(line.trim().to_string())
    }
}
