use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use drift_events::{ActivityJournal, JournalConfig, RecoveryMode};
use drift_protocol::{
    Activity, ActivityEnvelope, ActivityKind, PulseStatus, SessionId, SessionPulse,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "driftctl")]
#[command(about = "Inspect drift session logs and derived session state")]
struct Cli {
    #[arg(long, env = "DRIFT_ROOT", default_value = ".drift", global = true)]
    root: PathBuf,
    /// Emit logs as JSON lines instead of compact text.
    #[arg(long, global = true)]
    log_json: bool,
    #[arg(long, value_enum, default_value_t = Recovery::Skip, global = true)]
    recovery: Recovery,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Recovery {
    /// Skip records that fail to decode and keep reading.
    Skip,
    /// Stop at the first record that fails to decode.
    Abort,
}

impl From<Recovery> for RecoveryMode {
    fn from(recovery: Recovery) -> Self {
        match recovery {
            Recovery::Skip => RecoveryMode::SkipCorrupt,
            Recovery::Abort => RecoveryMode::Abort,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate an envelope and append it to a session's log.
    Append {
        #[arg(long)]
        session: SessionId,
        /// The envelope as a JSON object.
        #[arg(long)]
        envelope: String,
    },
    /// Print a session's decoded activities in arrival order.
    History {
        #[arg(long)]
        session: SessionId,
    },
    /// Derive the session state from a raw status and the stored history.
    Status {
        #[arg(long)]
        session: SessionId,
        /// Status name (`completed`, `in_progress`, ...) or integer code.
        #[arg(long)]
        pulse: PulseStatus,
        #[arg(long)]
        delivered: bool,
    },
    /// List sessions that have a log under the root.
    Sessions,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn summarize(activity: &Activity) -> String {
    match &activity.kind {
        ActivityKind::SessionAssigned { task } => format!("assigned: {task}"),
        ActivityKind::PlanProposed { plan_id, steps } => {
            format!("plan {plan_id} proposed ({} steps)", steps.len())
        }
        ActivityKind::PlanApproved { plan_id } => format!("plan {plan_id} approved"),
        ActivityKind::Message { text } => text.clone(),
        ActivityKind::Progress { note } => note.clone(),
        ActivityKind::Failure { reason } => format!("failed: {reason}"),
        ActivityKind::Result { artifacts } => format!("result with {} artifacts", artifacts.len()),
        ActivityKind::Unrecognized { type_tag, .. } => format!("unrecognized `{type_tag}`"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let journal = ActivityJournal::from_config(JournalConfig {
        root: cli.root.clone(),
        recovery: cli.recovery.into(),
    });

    match cli.command {
        Command::Append { session, envelope } => {
            let envelope: ActivityEnvelope =
                serde_json::from_str(&envelope).context("envelope is not valid JSON")?;
            let activity = journal.append_envelope(&session, &envelope).await?;
            info!(session_id = %session, activity_id = %activity.id, "activity appended");
        }
        Command::History { session } => {
            let history = journal.load(&session).await?;
            for activity in history.activities() {
                let marker = if activity.is_significant() { "*" } else { " " };
                println!(
                    "{marker} {} {:<16} {}",
                    activity.timestamp.instant().to_rfc3339(),
                    activity.kind.type_tag(),
                    summarize(activity)
                );
            }
            for skipped in history.skipped() {
                warn!(line = skipped.line(), error = %skipped, "record skipped");
            }
        }
        Command::Status {
            session,
            pulse,
            delivered,
        } => {
            let state = journal
                .derive_state(&session, &SessionPulse::new(pulse), delivered)
                .await?;
            println!("{state}");
        }
        Command::Sessions => {
            let store = drift_events::FileEnvelopeStore::new(&cli.root);
            for session in store.session_ids().await? {
                println!("{session}");
            }
        }
    }

    Ok(())
}
