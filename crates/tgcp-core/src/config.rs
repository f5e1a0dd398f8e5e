use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::normalize_handle, errors::Error, keywords::parse_keywords, Result};

pub const DEFAULT_SOURCE_CHAT: &str = "NSbaraholka";
pub const DEFAULT_SESSION_FILE: &str = "telegram.session";
pub const DEFAULT_LEDGER_FILE: &str = "forwarded_messages.json";
pub const DOTENV_FILE: &str = ".env";

/// How matches are delivered to the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryBackend {
    /// Forward through the logged-in user account.
    User,
    /// Send through a Bot API token.
    Bot,
}

impl DeliveryBackend {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "" | "user" | "mtproto" => Ok(Self::User),
            "bot" => Ok(Self::Bot),
            other => Err(Error::Config(format!(
                "DELIVERY_BACKEND must be `user` or `bot`, got `{other}`"
            ))),
        }
    }
}

/// API credentials for the user account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub api_id: i32,
    pub api_hash: String,
    pub phone: String,
}

/// Typed configuration, read from `.env` + process environment.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory every relative path is anchored to.
    pub base_dir: PathBuf,

    // Account
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
    pub phone_number: Option<String>,
    pub session_file: PathBuf,

    // Monitoring
    pub source_chat: String,
    pub keywords: Vec<String>,
    pub forward_to: Option<String>,
    pub lookback_hours: u32,
    pub check_interval: Duration,
    pub retry_delay: Duration,
    pub forwarded_messages_file: PathBuf,

    // Delivery
    pub delivery: DeliveryBackend,
    pub telegram_bot_token: Option<String>,
    pub forward_throttle: Duration,
}

impl Config {
    /// Load `<base_dir>/.env` (without overriding the environment) and build the config.
    pub fn load(base_dir: &Path) -> Result<Self> {
        load_dotenv_if_present(&base_dir.join(DOTENV_FILE));
        Self::from_lookup(base_dir, |key| env::var(key).ok())
    }

    pub fn from_lookup(base_dir: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let api_id = match get("API_ID") {
            Some(raw) => Some(raw.trim().parse::<i32>().map_err(|_| {
                Error::Config(format!("API_ID must be an integer, got `{raw}`"))
            })?),
            None => None,
        };
        let api_hash = get("API_HASH");
        let phone_number = get("PHONE_NUMBER");

        let keywords = parse_keywords(&get("KEYWORDS").unwrap_or_default());
        let forward_to = get("FORWARD_TO_USERNAME");
        let source_chat = normalize_handle(
            &get("SOURCE_CHAT").unwrap_or_else(|| DEFAULT_SOURCE_CHAT.to_string()),
        );
        if source_chat.is_empty() {
            return Err(Error::Config("SOURCE_CHAT must not be empty".to_string()));
        }

        let lookback_hours = parse_num(&get, "LOOKBACK_HOURS")?.unwrap_or(1);
        let check_interval = Duration::from_secs(parse_num(&get, "CHECK_INTERVAL_SECS")?.unwrap_or(3600));
        let retry_delay = Duration::from_secs(parse_num(&get, "RETRY_DELAY_SECS")?.unwrap_or(600));

        let session_file = anchored(
            base_dir,
            get("SESSION_FILE").unwrap_or_else(|| DEFAULT_SESSION_FILE.to_string()),
        );
        let forwarded_messages_file = anchored(
            base_dir,
            get("FORWARDED_MESSAGES_FILE").unwrap_or_else(|| DEFAULT_LEDGER_FILE.to_string()),
        );

        let delivery = DeliveryBackend::parse(&get("DELIVERY_BACKEND").unwrap_or_default())?;
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN");
        if delivery == DeliveryBackend::Bot && telegram_bot_token.is_none() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN is required when DELIVERY_BACKEND=bot".to_string(),
            ));
        }
        if delivery == DeliveryBackend::User {
            if let Some(target) = forward_to.as_deref() {
                if normalize_handle(target).parse::<i64>().is_ok() {
                    return Err(Error::Config(format!(
                        "FORWARD_TO_USERNAME `{target}` is a chat id; numeric targets need DELIVERY_BACKEND=bot"
                    )));
                }
            }
        }
        let forward_throttle =
            Duration::from_millis(parse_num(&get, "FORWARD_THROTTLE_MS")?.unwrap_or(1050));

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            api_id,
            api_hash,
            phone_number,
            session_file,
            source_chat,
            keywords,
            forward_to,
            lookback_hours,
            check_interval,
            retry_delay,
            forwarded_messages_file,
            delivery,
            telegram_bot_token,
            forward_throttle,
        })
    }

    /// Credentials needed to talk to Telegram as a user, if all are present.
    pub fn credentials(&self) -> Option<Credentials> {
        let api_id = self.api_id.filter(|id| *id != 0)?;
        Some(Credentials {
            api_id,
            api_hash: self.api_hash.clone()?,
            phone: self.phone_number.clone()?,
        })
    }

    pub fn dotenv_path(&self) -> PathBuf {
        self.base_dir.join(DOTENV_FILE)
    }
}

fn anchored(base_dir: &Path, value: String) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() {
        p
    } else {
        base_dir.join(p)
    }
}

fn parse_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got `{raw}`"))),
        None => Ok(None),
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
