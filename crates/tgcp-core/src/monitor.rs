//! One pass over a chat's recent history: match keywords, deliver, remember.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    domain::{normalize_handle, ChatInfo, ChatMessage, Recipient},
    formatting::{match_header, relative_time},
    keywords::matching_keywords,
    ledger::ForwardLedger,
    ports::{DeliveryPort, HistoryPort, SessionPort},
    Result,
};

/// Counters for one scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Text messages inside the time window.
    pub processed: usize,
    /// New (not yet forwarded) messages with at least one keyword.
    pub matched: usize,
    /// Matches that were already in the ledger.
    pub skipped: usize,
    pub forwarded: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed(ScanReport),
    NotAuthorized,
    ChatNotFound(String),
    TargetNotFound(String),
}

pub struct Monitor {
    cfg: Arc<Config>,
    session: Arc<dyn SessionPort>,
    history: Arc<dyn HistoryPort>,
    delivery: Arc<dyn DeliveryPort>,
}

impl Monitor {
    pub fn new(
        cfg: Arc<Config>,
        session: Arc<dyn SessionPort>,
        history: Arc<dyn HistoryPort>,
        delivery: Arc<dyn DeliveryPort>,
    ) -> Self {
        Self {
            cfg,
            session,
            history,
            delivery,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Scan the configured source chat.
    pub async fn scan(&self, hours_back: u32) -> Result<ScanOutcome> {
        self.scan_chat(&self.cfg.source_chat, hours_back).await
    }

    /// Scan `chat` for the last `hours_back` hours. Connects and always disconnects.
    pub async fn scan_chat(&self, chat: &str, hours_back: u32) -> Result<ScanOutcome> {
        let chat = normalize_handle(chat);
        let cutoff = Utc::now() - Duration::hours(i64::from(hours_back));

        info!("🔄 Getting messages from {chat} from last {hours_back} hours...");
        if self.cfg.keywords.is_empty() {
            warn!("no KEYWORDS configured; nothing can match");
        } else {
            info!("🔍 Looking for keywords: {}", self.cfg.keywords.join(", "));
        }
        info!(
            "📅 Getting messages since: {}",
            cutoff.format("%Y-%m-%d %H:%M:%S")
        );

        let mut ledger =
            ForwardLedger::load(&self.cfg.forwarded_messages_file, &self.cfg.source_chat);
        info!(
            "📝 Loaded {} previously forwarded message IDs",
            ledger.len_for(&chat)
        );

        let result = match self.session.connect().await {
            Ok(()) => self.scan_connected(&chat, cutoff, &mut ledger).await,
            Err(e) => Err(e),
        };
        self.session.disconnect().await;

        if let Ok(ScanOutcome::Completed(report)) = &result {
            log_summary(report, hours_back);
        }
        result
    }

    async fn scan_connected(
        &self,
        chat_handle: &str,
        cutoff: DateTime<Utc>,
        ledger: &mut ForwardLedger,
    ) -> Result<ScanOutcome> {
        if !self.session.is_authorized().await? {
            error!("❌ Not logged in! Run `tgcp login` first.");
            return Ok(ScanOutcome::NotAuthorized);
        }

        let chat = match self.history.resolve_chat(chat_handle).await {
            Ok(Some(chat)) => chat,
            Ok(None) => {
                error!("❌ Could not find chat '{chat_handle}'");
                return Ok(ScanOutcome::ChatNotFound(chat_handle.to_string()));
            }
            Err(e) => {
                error!("❌ Could not find chat '{chat_handle}': {e}");
                return Ok(ScanOutcome::ChatNotFound(chat_handle.to_string()));
            }
        };
        info!("✅ Found chat: {}", chat.title);

        let Some(target_handle) = self.cfg.forward_to.as_deref() else {
            error!("❌ FORWARD_TO_USERNAME is not set");
            return Ok(ScanOutcome::TargetNotFound(String::new()));
        };
        let target_handle = normalize_handle(target_handle);
        let target = match self.delivery.resolve_target(&target_handle).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                error!("❌ Could not find user '{target_handle}'");
                return Ok(ScanOutcome::TargetNotFound(target_handle));
            }
            Err(e) => {
                error!("❌ Could not find user '{target_handle}': {e}");
                return Ok(ScanOutcome::TargetNotFound(target_handle));
            }
        };
        info!("✅ Found target user: {}", target.display_name);

        let messages = self.history.messages_since(&chat, cutoff).await?;
        let mut report = ScanReport::default();

        for message in &messages {
            if message.date < cutoff {
                break;
            }
            if message.text.is_empty() {
                continue;
            }
            report.processed += 1;

            let hits = matching_keywords(&self.cfg.keywords, &message.text);
            if hits.is_empty() {
                continue;
            }

            if ledger.contains(&chat.handle, message.id) {
                info!("⏩ SKIP! Message {} already forwarded", message.id);
                report.skipped += 1;
                continue;
            }

            report.matched += 1;
            info!(
                "🎯 MATCH! Found keywords {hits:?} in message {} from {}",
                message.id,
                message.sender_name()
            );

            match self.deliver(&target, &chat, message, &hits).await {
                Ok(()) => {
                    info!("✅ Forwarded to {}", target.display_name);
                    report.forwarded += 1;
                    if let Err(e) = ledger.record(&chat.handle, message.id) {
                        error!(
                            "failed to save {}: {e}",
                            ledger.path().display()
                        );
                    }
                }
                Err(e) => {
                    error!("❌ Failed to forward message {}: {e}", message.id);
                    report.failed += 1;
                }
            }
        }

        Ok(ScanOutcome::Completed(report))
    }

    async fn deliver(
        &self,
        target: &Recipient,
        chat: &ChatInfo,
        message: &ChatMessage,
        hits: &[String],
    ) -> Result<()> {
        let time_ago = relative_time(Utc::now() - message.date);
        let header = match_header(hits, &time_ago);
        debug!("sending header: {header}");

        self.delivery.send_text(target, &header).await?;
        self.delivery.forward(target, chat, message).await
    }
}

fn log_summary(report: &ScanReport, hours_back: u32) {
    info!(
        "📨 Processed {} messages from last {hours_back} hours",
        report.processed
    );
    info!("🎯 Found {} new matching messages", report.matched);
    if report.skipped > 0 {
        info!("⏩ Skipped {} already forwarded messages", report.skipped);
    }
    if report.failed > 0 {
        warn!("❌ {} matches could not be forwarded", report.failed);
    }
    if report.matched == 0 && report.skipped == 0 {
        info!("😔 No messages found with your keywords in the specified time period");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{message, FakeTelegram, Sent};
    use std::{collections::HashMap, path::Path};

    fn config(base: &Path, keywords: &str) -> Arc<Config> {
        let mut env = HashMap::new();
        env.insert("KEYWORDS", keywords.to_string());
        env.insert("SOURCE_CHAT", "@market".to_string());
        env.insert("FORWARD_TO_USERNAME", "@me".to_string());
        Arc::new(Config::from_lookup(base, |k| env.get(k).cloned()).unwrap())
    }

    fn monitor(cfg: Arc<Config>, tg: Arc<FakeTelegram>) -> Monitor {
        Monitor::new(cfg, tg.clone(), tg.clone(), tg)
    }

    #[tokio::test]
    async fn forwards_matches_with_header_and_records_them() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "lego,bike");
        let tg = Arc::new(FakeTelegram::with_market(vec![
            message(3, 5, "Selling LEGO and a Bike"),
            message(2, 10, "sofa, almost new"),
            message(1, 20, "kids bike"),
        ]));

        let outcome = monitor(cfg.clone(), tg.clone()).scan(1).await.unwrap();

        assert_eq!(
            outcome,
            ScanOutcome::Completed(ScanReport {
                processed: 3,
                matched: 2,
                skipped: 0,
                forwarded: 2,
                failed: 0,
            })
        );
        let sent = tg.sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(
            sent[0],
            Sent::Text {
                to: "me".to_string(),
                text: "🔥 Keyword match: lego, bike (5 minutes ago)".to_string(),
            }
        );
        assert_eq!(
            sent[1],
            Sent::Forward {
                to: "me".to_string(),
                message_id: 3
            }
        );
        assert_eq!(tg.forwarded_ids(), vec![3, 1]);

        let ledger = ForwardLedger::load(&cfg.forwarded_messages_file, &cfg.source_chat);
        assert!(ledger.contains("market", 3));
        assert!(ledger.contains("market", 1));
        assert!(!ledger.contains("market", 2));
        assert_eq!(tg.connects(), 1);
        assert_eq!(tg.disconnects(), 1);
    }

    #[tokio::test]
    async fn second_scan_skips_already_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "lego");
        let tg = Arc::new(FakeTelegram::with_market(vec![message(7, 1, "lego city")]));
        let monitor = monitor(cfg, tg.clone());

        monitor.scan(1).await.unwrap();
        let outcome = monitor.scan(1).await.unwrap();

        assert_eq!(
            outcome,
            ScanOutcome::Completed(ScanReport {
                processed: 1,
                matched: 0,
                skipped: 1,
                forwarded: 0,
                failed: 0,
            })
        );
        assert_eq!(tg.forwarded_ids(), vec![7]);
    }

    #[tokio::test]
    async fn same_message_id_in_another_chat_is_still_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "lego");
        let mut fake = FakeTelegram::with_market(vec![message(7, 1, "lego city")]);
        fake.chats.insert(
            "other".to_string(),
            ChatInfo {
                id: -200,
                handle: "other".to_string(),
                title: "Other Market".to_string(),
            },
        );
        let tg = Arc::new(fake);
        let monitor = monitor(cfg.clone(), tg.clone());

        monitor.scan(1).await.unwrap();
        let outcome = monitor.scan_chat("@other", 1).await.unwrap();

        assert_eq!(
            outcome,
            ScanOutcome::Completed(ScanReport {
                processed: 1,
                matched: 1,
                skipped: 0,
                forwarded: 1,
                failed: 0,
            })
        );
        assert_eq!(tg.forwarded_ids(), vec![7, 7]);

        let ledger = ForwardLedger::load(&cfg.forwarded_messages_file, &cfg.source_chat);
        assert!(ledger.contains("market", 7));
        assert!(ledger.contains("other", 7));
    }

    #[tokio::test]
    async fn failed_forward_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "lego");
        let mut fake = FakeTelegram::with_market(vec![
            message(9, 1, "lego technic"),
            message(8, 2, "lego duplo"),
        ]);
        fake.fail_forward_for.insert(9);
        let tg = Arc::new(fake);

        let outcome = monitor(cfg.clone(), tg.clone()).scan(1).await.unwrap();

        let ScanOutcome::Completed(report) = outcome else {
            panic!("expected completed scan, got {outcome:?}");
        };
        assert_eq!(report.matched, 2);
        assert_eq!(report.forwarded, 1);
        assert_eq!(report.failed, 1);

        let ledger = ForwardLedger::load(&cfg.forwarded_messages_file, &cfg.source_chat);
        assert!(!ledger.contains("market", 9));
        assert!(ledger.contains("market", 8));
    }

    #[tokio::test]
    async fn stops_at_cutoff_and_ignores_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "lego");
        let tg = Arc::new(FakeTelegram::with_market(vec![
            message(5, 1, ""),
            message(4, 30, "lego"),
            message(3, 90, "lego, too old"),
        ]));

        let outcome = monitor(cfg, tg.clone()).scan(1).await.unwrap();

        let ScanOutcome::Completed(report) = outcome else {
            panic!("expected completed scan, got {outcome:?}");
        };
        assert_eq!(report.processed, 1);
        assert_eq!(tg.forwarded_ids(), vec![4]);
    }

    #[tokio::test]
    async fn unauthorized_session_aborts_scan() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "lego");
        let tg = Arc::new(FakeTelegram::with_market(vec![message(1, 1, "lego")]));
        *tg.authorized.lock().unwrap() = false;

        let outcome = monitor(cfg, tg.clone()).scan(1).await.unwrap();

        assert_eq!(outcome, ScanOutcome::NotAuthorized);
        assert!(tg.sent().is_empty());
        assert_eq!(tg.disconnects(), 1);
    }

    #[tokio::test]
    async fn unknown_chat_and_target_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "lego");
        let tg = Arc::new(FakeTelegram::with_market(vec![]));
        let monitor = monitor(cfg, tg.clone());

        assert_eq!(
            monitor.scan_chat("https://t.me/elsewhere", 1).await.unwrap(),
            ScanOutcome::ChatNotFound("elsewhere".to_string())
        );

        let dir = tempfile::tempdir().unwrap();
        let mut env = HashMap::new();
        env.insert("SOURCE_CHAT", "market".to_string());
        env.insert("FORWARD_TO_USERNAME", "nobody".to_string());
        let cfg = Arc::new(Config::from_lookup(dir.path(), |k| env.get(k).cloned()).unwrap());
        let monitor = Monitor::new(cfg, tg.clone(), tg.clone(), tg.clone());
        assert_eq!(
            monitor.scan(1).await.unwrap(),
            ScanOutcome::TargetNotFound("nobody".to_string())
        );
    }

    #[tokio::test]
    async fn connect_failure_still_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "lego");
        let mut fake = FakeTelegram::with_market(vec![]);
        fake.fail_connect = true;
        let tg = Arc::new(fake);

        assert!(monitor(cfg, tg.clone()).scan(1).await.is_err());
        assert_eq!(tg.disconnects(), 1);
    }
}
