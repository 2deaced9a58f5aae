//! Portcullis - login throttle state inspector
//!
//! Operator tooling around the persisted throttle state file: inspect the
//! reconciled counters, dry-run the gate, simulate attempt outcomes, and
//! reset the state.

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portcullis_core::{
    AttemptOutcome, BlockReason, Decision, JsonFileStore, LoginThrottle, ThrottlePolicy,
};

/// Portcullis - advisory login throttling
#[derive(Parser)]
#[command(name = "portcullis")]
#[command(about = "Inspect and simulate client-side login throttle state")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the throttle state file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Use the strict policy preset instead of the default
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the reconciled counters and any active block
    Status,

    /// Exit 0 if an attempt would be allowed, 1 if blocked
    Check,

    /// Simulate an attempt outcome against the state file
    Record {
        /// Outcome to record
        #[arg(value_enum)]
        outcome: Outcome,
    },

    /// Remove the persisted state
    Reset,
}

#[derive(Clone, Copy, ValueEnum)]
enum Outcome {
    Success,
    InvalidCredential,
    OtherFailure,
    PreconditionFailure,
}

impl From<Outcome> for AttemptOutcome {
    fn from(o: Outcome) -> Self {
        match o {
            Outcome::Success => AttemptOutcome::Success,
            Outcome::InvalidCredential => AttemptOutcome::InvalidCredential,
            Outcome::OtherFailure => AttemptOutcome::OtherFailure,
            Outcome::PreconditionFailure => AttemptOutcome::PreconditionFailure,
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portcullis=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let path = cli.state_file.unwrap_or_else(JsonFileStore::default_path);
    let policy = if cli.strict {
        ThrottlePolicy::strict()
    } else {
        ThrottlePolicy::default()
    };

    let now = Local::now().naive_local();
    let store = JsonFileStore::new(path.clone());
    let mut throttle = LoginThrottle::new(policy, store, now);

    match cli.command {
        Commands::Status => {
            let decision = throttle.check_allowed(now);
            let state = throttle.state();
            println!("state file:              {}", path.display());
            println!("date:                    {}", state.last_attempt_date);
            println!("attempts in burst:       {}", state.attempt_count);
            println!("attempts today:          {}", state.daily_attempts);
            println!(
                "failed passwords today:  {}",
                state.daily_failed_password_attempts
            );
            println!("blocks triggered today:  {}", state.block_escalation_level);
            match decision {
                Decision::Allowed => println!("gate:                    allowed"),
                Decision::Blocked {
                    reason,
                    retry_after_secs,
                } => println!(
                    "gate:                    blocked ({}, retry in {}s)",
                    describe(reason),
                    retry_after_secs
                ),
            }
        }
        Commands::Check => match throttle.check_allowed(now) {
            Decision::Allowed => println!("allowed"),
            Decision::Blocked {
                reason,
                retry_after_secs,
            } => {
                println!("blocked: {}, retry in {}s", describe(reason), retry_after_secs);
                return Ok(ExitCode::FAILURE);
            }
        },
        Commands::Record { outcome } => {
            throttle.record_outcome(outcome.into(), now);
            info!("outcome recorded");
            match throttle.check_allowed(now) {
                Decision::Allowed => println!("next attempt: allowed"),
                Decision::Blocked {
                    reason,
                    retry_after_secs,
                } => println!(
                    "next attempt: blocked ({}, retry in {}s)",
                    describe(reason),
                    retry_after_secs
                ),
            }
        }
        Commands::Reset => {
            throttle.reset(now)?;
            info!("throttle state cleared");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn describe(reason: BlockReason) -> &'static str {
    match reason {
        BlockReason::TemporaryCooldown => "temporary cooldown",
        BlockReason::DailyLimit => "daily limit",
    }
}
