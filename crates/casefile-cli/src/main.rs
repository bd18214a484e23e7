//! `casefile`: drive form reconciliation, answering and sync from a
//! terminal.
//!
//! # Usage
//!
//! ```text
//! casefile --config casefile.toml refresh
//! casefile beneficiary add --name "Ana Pop" --birth-date 1950-03-14 \
//!   --civil-status widowed --county 1 --city 10 --gender female
//! casefile select --form 10 --beneficiary -1 --question 100 --option 0
//! casefile sync
//! ```

mod commands;
mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use casefile_core::beneficiary::{CivilStatus, Gender};
use casefile_engine::Engine;
use casefile_remote::HttpGateway;
use casefile_store_sqlite::SqliteStore;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::ClientConfig;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "casefile", version, about = "Offline survey forms and answer sync")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "casefile.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Bring cached forms up to date with the remote.
  Refresh,
  /// Push unsynced answers once.
  Sync,
  /// Cached forms, beneficiaries and pending answers.
  Status,
  /// List cached forms.
  Forms,
  /// Manage beneficiaries.
  #[command(subcommand)]
  Beneficiary(BeneficiaryCommand),
  /// Show the fill state of a form.
  Show {
    #[command(flatten)]
    target: FormTarget,
    /// Print the view as JSON.
    #[arg(long)]
    json:   bool,
  },
  /// Tap an option (zero-based position within the question).
  Select {
    #[command(flatten)]
    target:   FormTarget,
    #[arg(long)]
    question: i64,
    #[arg(long)]
    option:   usize,
  },
  /// Enter free text on an option.
  Text {
    #[command(flatten)]
    target:   FormTarget,
    #[arg(long)]
    question: i64,
    #[arg(long)]
    option:   usize,
    #[arg(long)]
    text:     String,
  },
  /// Set a note on a question; omit `--text` to clear it.
  Note {
    #[command(flatten)]
    target:   FormTarget,
    #[arg(long)]
    question: i64,
    #[arg(long)]
    text:     Option<String>,
  },
  /// Check that every mandatory question is answered.
  Finalize {
    #[command(flatten)]
    target: FormTarget,
  },
  /// Forms a beneficiary answered completely.
  Filled {
    #[arg(long, allow_negative_numbers = true)]
    beneficiary: i64,
  },
}

#[derive(Args)]
struct FormTarget {
  #[arg(long)]
  form:        i64,
  #[arg(long, allow_negative_numbers = true)]
  beneficiary: i64,
}

#[derive(Subcommand)]
enum BeneficiaryCommand {
  /// Create a beneficiary locally under a temporary id.
  Add {
    #[arg(long)]
    name:         String,
    /// YYYY-MM-DD
    #[arg(long)]
    birth_date:   chrono::NaiveDate,
    #[arg(long, value_enum)]
    civil_status: CivilStatusArg,
    /// County id.
    #[arg(long)]
    county:       i64,
    /// City id within the county.
    #[arg(long)]
    city:         i64,
    #[arg(long, value_enum)]
    gender:       GenderArg,
  },
  List,
  /// Send a beneficiary and its form selection to the remote.
  Register {
    #[arg(long, allow_negative_numbers = true)]
    id:     i64,
    /// Form ids to assign (comma separated).
    #[arg(long, value_delimiter = ',')]
    add:    Vec<i64>,
    /// Form ids to withdraw (comma separated).
    #[arg(long, value_delimiter = ',')]
    remove: Vec<i64>,
  },
}

#[derive(Clone, Copy, ValueEnum)]
enum CivilStatusArg {
  NotMarried,
  Married,
  Divorced,
  Widowed,
}

#[derive(Clone, Copy, ValueEnum)]
enum GenderArg {
  Male,
  Female,
}

pub type AppEngine = Engine<SqliteStore, SqliteStore, HttpGateway>;

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ClientConfig::load(&cli.config)?;

  if let Some(dir) = cfg.store_path.parent() {
    std::fs::create_dir_all(dir)
      .with_context(|| format!("failed to create {}", dir.display()))?;
  }
  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  let gateway = HttpGateway::new(cfg.gateway()).context("failed to build gateway")?;

  let store = Arc::new(store);
  let engine = Engine::new(store.clone(), store.clone(), Arc::new(gateway));
  let ctx = commands::Context { engine, store };

  match cli.command {
    Command::Refresh => commands::refresh(&ctx).await,
    Command::Sync => commands::sync(&ctx).await,
    Command::Status => commands::status(&ctx).await,
    Command::Forms => commands::forms(&ctx).await,
    Command::Beneficiary(cmd) => match cmd {
      BeneficiaryCommand::Add { name, birth_date, civil_status, county, city, gender } => {
        let civil_status = match civil_status {
          CivilStatusArg::NotMarried => CivilStatus::NotMarried,
          CivilStatusArg::Married => CivilStatus::Married,
          CivilStatusArg::Divorced => CivilStatus::Divorced,
          CivilStatusArg::Widowed => CivilStatus::Widowed,
        };
        let gender = match gender {
          GenderArg::Male => Gender::Male,
          GenderArg::Female => Gender::Female,
        };
        let input = commands::NewBeneficiary {
          name,
          birth_date,
          civil_status,
          county_id: county,
          city_id: city,
          gender,
        };
        commands::add_beneficiary(&ctx, input).await
      }
      BeneficiaryCommand::List => commands::list_beneficiaries(&ctx).await,
      BeneficiaryCommand::Register { id, add, remove } => {
        commands::register(&ctx, id, add, remove).await
      }
    },
    Command::Show { target, json } => {
      commands::show(&ctx, target.form, target.beneficiary, json).await
    }
    Command::Select { target, question, option } => {
      commands::select(&ctx, target.form, target.beneficiary, question, option).await
    }
    Command::Text { target, question, option, text } => {
      commands::text(&ctx, target.form, target.beneficiary, question, option, &text).await
    }
    Command::Note { target, question, text } => {
      commands::note(&ctx, target.form, target.beneficiary, question, text).await
    }
    Command::Finalize { target } => {
      commands::finalize(&ctx, target.form, target.beneficiary).await
    }
    Command::Filled { beneficiary } => commands::filled(&ctx, beneficiary).await,
  }
}
