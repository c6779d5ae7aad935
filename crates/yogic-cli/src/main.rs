// ============================================================================
// yogic-steps: CLI for the Yogic Mile step tracking engine
// ============================================================================
// Usage:
//   yogic-steps status                              Show today's step snapshot
//   yogic-steps ingest --source health --count 4200 Apply a source reading
//   yogic-steps speed --kmh 5.2 --accuracy 8        Record a GPS speed sample
//   yogic-steps manual --steps 500                  Add manual steps (speed gated)
//   yogic-steps reset-daily                         Start a new day
//   yogic-steps connect-wearable [--disconnect]     Toggle the wearable link
//   yogic-steps export                              Dump local state as JSON
//   yogic-steps otp-send 9876543210                 Request an OTP
//   yogic-steps otp-verify 9876543210 123456        Verify an OTP
//   yogic-steps sync --user-id ID [--token T]       Flush pending steps
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use yogic_core::db::{has_shown_onboarding, mark_onboarding_shown};
use yogic_core::platform::CapabilityError;
use yogic_core::sync::SupabaseBalanceClient;
use yogic_core::{
    BackendConfig, KeyValueStore, Notifier, OtpError, OtpTransport, Platform, SessionHandle, StepDb,
    StepReconciler, StepSnapshot, StepSource, SyncOutcome, SyncScheduler, TrackerConfig,
    UserSession,
};

/// Yogic Mile step tracking tool
#[derive(Parser)]
#[command(name = "yogic-steps", version, about = "Inspect and drive the Yogic Mile step engine")]
struct Cli {
    /// Path to the database file (default: $YOGIC_DB_PATH or ~/.yogic/steps.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current step snapshot
    Status,

    /// Apply a cumulative-since-midnight reading from one source
    Ingest {
        /// sensor, health or wearable
        #[arg(long)]
        source: String,

        #[arg(long, allow_hyphen_values = true)]
        count: i64,
    },

    /// Record a location speed sample
    Speed {
        #[arg(long)]
        kmh: f64,

        /// GPS accuracy in meters
        #[arg(long, default_value = "10")]
        accuracy: f64,
    },

    /// Add manually entered steps
    Manual {
        #[arg(long, allow_hyphen_values = true)]
        steps: i64,
    },

    /// Zero today's and pending counters (lifetime is kept)
    ResetDaily,

    /// Mark the wearable platform as linked or unlinked
    ConnectWearable {
        #[arg(long)]
        disconnect: bool,
    },

    /// Export local state as JSON
    Export,

    /// Request an OTP for a mobile number
    OtpSend { mobile: String },

    /// Verify an OTP code
    OtpVerify { mobile: String, code: String },

    /// Flush pending steps to the balance service
    Sync {
        #[arg(long)]
        user_id: String,

        /// Access token (defaults to the anon key)
        #[arg(long)]
        token: Option<String>,
    },
}

/// Prints milestone notifications to the terminal
struct TerminalNotifier;

#[async_trait]
impl Notifier for TerminalNotifier {
    async fn haptic(&self) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn notify(&self, title: &str, body: &str) -> Result<(), CapabilityError> {
        println!("🎉 {}: {}", title, body);
        Ok(())
    }
}

fn format_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn open_reconciler(db: Arc<StepDb>) -> StepReconciler {
    let reconciler = StepReconciler::new(TrackerConfig::from_env(), db, Arc::new(TerminalNotifier));
    if reconciler.roll_day_if_needed(Local::now().date_naive()) {
        println!("New day started, daily steps reset.");
    }
    reconciler
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal outside development
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("yogic_core=warn".parse()?)
                .add_directive("yogic_steps=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::OtpSend { mobile } => cmd_otp_send(&mobile).await,
        Commands::OtpVerify { mobile, code } => cmd_otp_verify(&mobile, &code).await,
        command => run_local(cli.db_path.as_deref(), command).await,
    }
}

/// Commands that only touch the local database (and `sync`)
async fn run_local(db_path: Option<&str>, command: Commands) -> Result<()> {
    let db = Arc::new(StepDb::open(db_path)?);
    info!("Using database {}", db.path().display());

    match command {
        Commands::Status => cmd_status(&db),
        Commands::Ingest { source, count } => cmd_ingest(db, &source, count).await,
        Commands::Speed { kmh, accuracy } => cmd_speed(db, kmh, accuracy),
        Commands::Manual { steps } => cmd_manual(db, steps).await,
        Commands::ResetDaily => cmd_reset_daily(db),
        Commands::ConnectWearable { disconnect } => cmd_connect_wearable(db, !disconnect),
        Commands::Export => cmd_export(&db),
        Commands::Sync { user_id, token } => cmd_sync(db, user_id, token).await,
        Commands::OtpSend { .. } | Commands::OtpVerify { .. } => {
            anyhow::bail!("OTP commands do not use the local database")
        }
    }
}

fn print_snapshot(snap: &StepSnapshot, max_daily: u64) {
    println!(
        "Today:     {} / {} steps{}",
        snap.daily_steps,
        max_daily,
        if snap.daily_steps >= max_daily { " (daily limit reached)" } else { "" }
    );
    println!("Lifetime:  {}", snap.lifetime_steps);
    println!("Pending:   {}", snap.pending_steps);
    println!("Device:    {}", snap.device_steps);
    println!(
        "Wearable:  {} ({}, last sync {})",
        snap.third_party_steps,
        if snap.third_party_connected { "linked" } else { "not linked" },
        format_time(snap.last_third_party_sync)
    );
    println!(
        "Speed:     {:.1} km/h ±{:.0} m{}",
        snap.current_speed_kmh,
        snap.gps_accuracy_meters,
        if snap.is_valid_speed { "" } else { " (too fast)" }
    );
    println!("Last sync: {}", format_time(snap.last_sync_time));
}

fn cmd_status(db: &Arc<StepDb>) -> Result<()> {
    let reconciler = open_reconciler(Arc::clone(db));

    println!("=== Yogic Mile Steps ===");
    println!("Database: {}", db.path().display());
    println!("Platform: {:?}", Platform::detect());
    if let Some(day) = reconciler.snapshot().day {
        println!("Day:      {}", day);
    }
    println!();
    print_snapshot(&reconciler.snapshot(), reconciler.config().max_daily_steps);

    if !has_shown_onboarding(&**db) {
        println!("\nTip: readings from several sources never double count; the highest wins.");
        mark_onboarding_shown(&**db)?;
    }
    Ok(())
}

async fn cmd_ingest(db: Arc<StepDb>, source: &str, count: i64) -> Result<()> {
    let source: StepSource = source
        .parse()
        .context("Valid sources: sensor, health, wearable")?;
    if count < 0 {
        anyhow::bail!("Step count must not be negative (got {})", count);
    }

    let reconciler = open_reconciler(db);
    let before = reconciler.snapshot();
    let after = reconciler.ingest(source, count, Utc::now()).await;

    println!(
        "{}: {} → daily {} (+{})",
        source.as_str(),
        count,
        after.daily_steps,
        after.daily_steps - before.daily_steps
    );
    Ok(())
}

fn cmd_speed(db: Arc<StepDb>, kmh: f64, accuracy: f64) -> Result<()> {
    let reconciler = open_reconciler(db);
    reconciler.record_speed_sample(kmh, accuracy);

    let snap = reconciler.snapshot();
    if snap.is_valid_speed {
        println!("Speed {:.1} km/h recorded", snap.current_speed_kmh);
    } else {
        println!(
            "Speed {:.1} km/h is above the walking limit; manual steps are blocked",
            snap.current_speed_kmh
        );
    }
    Ok(())
}

async fn cmd_manual(db: Arc<StepDb>, steps: i64) -> Result<()> {
    let reconciler = open_reconciler(db);
    let snap = reconciler.add_manual_steps(steps, Utc::now()).await?;
    println!("Added manual steps, daily now {}", snap.daily_steps);
    Ok(())
}

fn cmd_reset_daily(db: Arc<StepDb>) -> Result<()> {
    let reconciler = open_reconciler(db);
    reconciler.reset_daily();
    let snap = reconciler.snapshot();
    println!(
        "Daily counters reset (lifetime {}, pending {})",
        snap.lifetime_steps, snap.pending_steps
    );
    Ok(())
}

fn cmd_connect_wearable(db: Arc<StepDb>, connected: bool) -> Result<()> {
    let reconciler = open_reconciler(db);
    reconciler.set_third_party_connected(connected);
    println!(
        "Wearable {}",
        if connected { "linked" } else { "unlinked" }
    );
    Ok(())
}

fn cmd_export(db: &Arc<StepDb>) -> Result<()> {
    let reconciler = open_reconciler(Arc::clone(db));

    let mut raw = serde_json::Map::new();
    for key in db.keys()? {
        if let Some(value) = db.get(&key)? {
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            raw.insert(key, value);
        }
    }

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "database": db.path().display().to_string(),
        "snapshot": reconciler.snapshot(),
        "onboarding_shown": has_shown_onboarding(&**db),
        "raw": raw,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

async fn cmd_sync(db: Arc<StepDb>, user_id: String, token: Option<String>) -> Result<()> {
    let backend = BackendConfig::default();
    let reconciler = Arc::new(open_reconciler(db));

    let session = SessionHandle::new();
    session.sign_in(UserSession::new(user_id, token));

    let scheduler = SyncScheduler::new(
        Arc::clone(&reconciler),
        Arc::new(SupabaseBalanceClient::new(backend)),
        session,
    );

    match scheduler.flush().await? {
        SyncOutcome::Synced {
            steps,
            coins_earned,
            remaining,
        } => {
            println!("Synced {} steps", steps);
            if let Some(coins) = coins_earned {
                println!("Coins earned: {}", coins);
            }
            println!("Still pending: {}", remaining);
        }
        SyncOutcome::Skipped { reason } => println!("Nothing synced ({:?})", reason),
        SyncOutcome::InFlight => println!("A sync is already running"),
        SyncOutcome::Discarded => println!("Sync result discarded"),
    }
    Ok(())
}

fn report_otp_error(err: OtpError) -> Result<()> {
    if let OtpError::Failed {
        code,
        attempts,
        server_request_id,
        allow_proceed_to_otp,
        ..
    } = &err
    {
        for attempt in attempts {
            eprintln!(
                "  {:?}: {}",
                attempt.transport_tier,
                attempt.server_error_code.as_deref().unwrap_or("ok")
            );
        }
        eprintln!(
            "Error code {} (server request id: {})",
            code,
            server_request_id.as_deref().unwrap_or("-")
        );
        if *allow_proceed_to_otp {
            println!("Delivery unconfirmed. If an OTP arrives, verify it with `otp-verify`.");
        }
    }
    Err(err.into())
}

async fn cmd_otp_send(mobile: &str) -> Result<()> {
    let transport = OtpTransport::from_config(&BackendConfig::default());

    match transport.request_otp(mobile).await {
        Ok(delivery) => {
            println!("OTP sent via {:?}", delivery.tier);
            println!("Request id: {}", delivery.req_id.as_deref().unwrap_or("-"));
            println!("Client request id: {}", delivery.client_request_id);
            let failed = delivery.failed_attempts().count();
            if failed > 0 {
                println!("({} earlier attempt(s) failed)", failed);
            }
            Ok(())
        }
        Err(e) => report_otp_error(e),
    }
}

async fn cmd_otp_verify(mobile: &str, code: &str) -> Result<()> {
    let transport = OtpTransport::from_config(&BackendConfig::default());

    match transport.verify_otp(mobile, code).await {
        Ok(delivery) => {
            println!("OTP verified via {:?}", delivery.tier);
            Ok(())
        }
        Err(e) => report_otp_error(e),
    }
}
