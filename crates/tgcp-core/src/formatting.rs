use chrono::Duration;

use crate::domain::{ChatInfo, ChatMessage};

/// Human "time ago" for a message age, coarsest unit only.
pub fn relative_time(elapsed: Duration) -> String {
    if elapsed < Duration::zero() {
        return "just now".to_string();
    }

    let days = elapsed.num_days();
    let seconds = elapsed.num_seconds() - days * 86_400;

    if days > 0 {
        plural(days, "day")
    } else if seconds >= 3600 {
        plural(seconds / 3600, "hour")
    } else if seconds >= 60 {
        plural(seconds / 60, "minute")
    } else {
        "just now".to_string()
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n > 1 {
        format!("{n} {unit}s ago")
    } else {
        format!("{n} {unit} ago")
    }
}

/// Header sent right before a forwarded match.
pub fn match_header(keywords: &[String], time_ago: &str) -> String {
    format!("🔥 Keyword match: {} ({time_ago})", keywords.join(", "))
}

/// Plain-text copy of a message, for targets that cannot receive a real forward.
pub fn relay_text(chat: &ChatInfo, message: &ChatMessage) -> String {
    format!(
        "👤 {}\n📅 {} UTC\n\n{}\n\n🔗 https://t.me/{}/{}",
        message.sender_name(),
        message.date.format("%Y-%m-%d %H:%M:%S"),
        message.text,
        chat.handle,
        message.id
    )
}
