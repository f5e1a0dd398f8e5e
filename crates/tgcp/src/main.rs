use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tgcp_core::{
    auth::{self, LoginOutcome},
    config::{Config, DeliveryBackend},
    delivery::throttled::{ThrottleConfig, ThrottledDelivery},
    monitor::{Monitor, ScanOutcome},
    ports::{DeliveryPort, StdinPrompt},
    scheduler::Scheduler,
    Error,
};
use tgcp_mtproto::MtprotoClient;
use tgcp_telegram::BotDelivery;

#[derive(Parser, Debug)]
#[command(
    name = "tgcp",
    version,
    about = "Telegram chat parser: forwards messages matching keywords from a chat"
)]
struct Cli {
    /// Directory holding .env, the session and the ledger (default: this binary's directory)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Test the connection and sign in interactively
    Login,
    /// Scan the source chat once
    Scan {
        /// How far back to look
        #[arg(long, default_value_t = 6)]
        hours: u32,
        /// Chat to scan instead of SOURCE_CHAT
        #[arg(long)]
        chat: Option<String>,
    },
    /// Scan repeatedly until Ctrl+C
    Watch {
        /// Time between checks, e.g. `30m`, `1h` (default: CHECK_INTERVAL_SECS)
        #[arg(short, long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,
        /// How far back each check looks (default: LOOKBACK_HOURS)
        #[arg(long)]
        hours: Option<u32>,
        /// Stop after this many checks (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        max_runs: usize,
    },
    /// Show resolved paths and loaded settings
    Paths,
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let home = match &cli.home {
        Some(dir) => {
            let home = std::fs::canonicalize(dir).map_err(|e| Error::InvalidPath {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
            std::env::set_current_dir(&home)?;
            home
        }
        None => tgcp_launch::enter_home().map_err(|e| Error::External(e.to_string()))?,
    };

    // `.env` is applied to the process environment here, while the process is
    // still single-threaded and before the log filter reads RUST_LOG.
    let cfg = Arc::new(Config::load(&home)?);
    tgcp_core::logging::init("tgcp", cli.verbose)?;

    run(cli.command, cfg)
}

#[tokio::main]
async fn run(command: Option<Command>, cfg: Arc<Config>) -> Result<(), Error> {
    match command {
        Some(Command::Paths) => {
            show_paths(&cfg);
            Ok(())
        }
        Some(Command::Login) => run_login(&cfg).await.map(|_| ()),
        Some(Command::Scan { hours, chat }) => run_scan(cfg, hours, chat).await,
        Some(Command::Watch {
            interval,
            hours,
            max_runs,
        }) => run_watch(cfg, interval, hours, max_runs).await,
        None => {
            let login = run_login(&cfg).await;
            if let Err(e) = &login {
                error!("❌ Login check failed: {e}; starting monitoring anyway");
            }
            if watch_after_login(&login) {
                run_watch(cfg, None, None, 0).await
            } else {
                Ok(())
            }
        }
    }
}

/// Default flow: only missing credentials stop it. Other login failures are
/// retried by the watch loop.
fn watch_after_login(login: &Result<LoginOutcome, Error>) -> bool {
    !matches!(login, Ok(LoginOutcome::MissingCredentials))
}

async fn run_login(cfg: &Config) -> Result<LoginOutcome, Error> {
    let Some(creds) = cfg.credentials() else {
        auth::print_setup_instructions();
        return Ok(LoginOutcome::MissingCredentials);
    };
    let client = MtprotoClient::new(creds, cfg.session_file.clone());
    auth::login(cfg, &client, &StdinPrompt::stdin()).await
}

fn build_monitor(cfg: Arc<Config>) -> Result<Monitor, Error> {
    let creds = cfg.credentials().ok_or_else(|| {
        Error::Config(
            "API_ID, API_HASH and PHONE_NUMBER must be set (see `tgcp login`)".to_string(),
        )
    })?;
    let client = Arc::new(MtprotoClient::new(creds, cfg.session_file.clone()));

    let raw: Arc<dyn DeliveryPort> = match cfg.delivery {
        DeliveryBackend::User => client.clone(),
        DeliveryBackend::Bot => {
            let token = cfg.telegram_bot_token.clone().ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN is required for the bot backend".to_string())
            })?;
            Arc::new(BotDelivery::new(token))
        }
    };
    let delivery = Arc::new(ThrottledDelivery::new(
        raw,
        ThrottleConfig::per_recipient(cfg.forward_throttle),
    ));

    Ok(Monitor::new(cfg, client.clone(), client, delivery))
}

async fn run_scan(cfg: Arc<Config>, hours: u32, chat: Option<String>) -> Result<(), Error> {
    let chat = chat.unwrap_or_else(|| cfg.source_chat.clone());
    let monitor = build_monitor(cfg)?;

    match monitor.scan_chat(&chat, hours).await? {
        ScanOutcome::Completed(report) => {
            info!(
                "scan finished: {} forwarded, {} failed",
                report.forwarded, report.failed
            );
            Ok(())
        }
        ScanOutcome::NotAuthorized => Err(Error::Auth(
            "session is not authorized; run `tgcp login`".to_string(),
        )),
        ScanOutcome::ChatNotFound(chat) => {
            Err(Error::External(format!("chat `{chat}` not found")))
        }
        ScanOutcome::TargetNotFound(target) => Err(Error::Config(format!(
            "forward target `{target}` not found (check FORWARD_TO_USERNAME)"
        ))),
    }
}

async fn run_watch(
    cfg: Arc<Config>,
    interval: Option<Duration>,
    hours: Option<u32>,
    max_runs: usize,
) -> Result<(), Error> {
    let monitor = Arc::new(build_monitor(cfg.clone())?);

    let mut scheduler = Scheduler::new(monitor, &cfg).with_max_runs(max_runs);
    if let Some(interval) = interval {
        scheduler = scheduler.with_interval(interval);
    }
    if let Some(hours) = hours {
        scheduler = scheduler.with_lookback_hours(hours);
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("🛑 Ctrl+C received, stopping after the current check");
                    cancel.cancel();
                }
                Err(e) => error!("failed to listen for Ctrl+C: {e}"),
            }
        });
    }

    scheduler.run(cancel).await;
    Ok(())
}

fn show_paths(cfg: &Config) {
    let mark = |p: &std::path::Path| if p.exists() { "✅" } else { "❌" };
    let loaded = |b: bool| if b { "Yes" } else { "No" };

    println!("📁 Base directory: {}", cfg.base_dir.display());
    println!("📄 Session file path: {}", cfg.session_file.display());
    println!(
        "📄 Forwarded messages file: {}",
        cfg.forwarded_messages_file.display()
    );
    println!("🔑 API_ID loaded: {}", loaded(cfg.api_id.is_some()));
    println!("🔑 PHONE_NUMBER loaded: {}", loaded(cfg.phone_number.is_some()));
    println!("🔍 Keywords loaded: {:?}", cfg.keywords);
    println!("💬 Source chat: {}", cfg.source_chat);

    println!();
    println!("📂 File existence:");
    println!("  .env file: {}", mark(&cfg.dotenv_path()));
    println!("  Session file: {}", mark(&cfg.session_file));
    println!(
        "  Forwarded messages: {}",
        mark(&cfg.forwarded_messages_file)
    );
}
