use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fints_client::operations::balance::BalanceOperation;
use fints_client::operations::init::InitOperation;
use fints_client::operations::statement::{StatementFormat, StatementOperation};
use fints_client::operations::sync::SyncOperation;
use fints_client::operations::tan::TanMediaOperation;
use fints_client::{
    ClientError, HttpTransport, Session, TanChallenge, TanSource, Transaction, TransactionState,
    drive,
};
use fints_core::BankParameters;

mod config;
mod state;

#[derive(Parser, Debug)]
#[command(name = "fints", version, about = "FinTS/HBCI PIN/TAN sample client")]
struct Cli {
    /// Config file with the [connection] section (default: ~/.fints/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synchronize with the bank and persist the customer system id
    Sync,

    /// Fetch the current account balance
    Balance,

    /// Fetch account statements
    Statements {
        /// Start of the date range, YYYY-MM-DD
        #[arg(long)]
        from: Option<NaiveDate>,

        /// End of the date range, YYYY-MM-DD
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Request camt XML instead of MT940
        #[arg(long)]
        camt: bool,
    },

    /// List the TAN media registered for this login
    TanMedia,
}

/// Prompts on the terminal for each pending challenge. An empty answer
/// declines it and cancels the order.
struct StdinTanSource;

#[async_trait]
impl TanSource for StdinTanSource {
    async fn provide(&self, challenge: &TanChallenge) -> Result<Option<String>, ClientError> {
        if let Some(text) = &challenge.text {
            println!("{text}");
        }
        for process in &challenge.processes {
            println!("  available: {} ({})", process.name, process.number);
        }
        let tan = config::prompt("TAN (empty to cancel): ")
            .map_err(|e| ClientError::Step(e.to_string()))?;
        Ok(if tan.is_empty() { None } else { Some(tan) })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(p) => p,
        None => config::config_path()?,
    };
    let cfg = config::load_config(&config_path)?;
    let ctx = cfg.into_context()?;

    match cli.command {
        Command::Sync => sync(ctx).await?,
        Command::Balance => balance(ctx).await?,
        Command::Statements { from, to, camt } => {
            let format = if camt {
                StatementFormat::Camt
            } else {
                StatementFormat::Mt940
            };
            statements(ctx, format, from, to).await?;
        }
        Command::TanMedia => tan_media(ctx).await?,
    }

    Ok(())
}

async fn sync(ctx: fints_core::ConnectionContext) -> Result<()> {
    let bank_code = ctx.bank_code.clone();
    let login_id = ctx.login_id.clone();
    let mut session = Session::new(ctx, Box::new(HttpTransport::new()));

    let mut tx = Transaction::new(Box::new(SyncOperation));
    let state = tx.run(&mut session, &StdinTanSource).await?;
    if state != TransactionState::Finished {
        bail!(
            "synchronization failed: {}",
            tx.result()
                .map(|r| r.error_summary())
                .unwrap_or_default()
        );
    }
    session.end_dialog().await?;

    let ctx = session.into_context();
    state::write_snapshot(
        &bank_code,
        &login_id,
        &state::Snapshot {
            customer_system_id: ctx.customer_system_id.clone(),
            bank_parameters: ctx.bpd.raw.clone(),
            updated_at_utc: Some(Utc::now().to_rfc3339()),
        },
    )?;

    println!(
        "Synchronized. Customer system id: {}",
        ctx.customer_system_id.as_deref().unwrap_or("(none)")
    );
    if !ctx.tan_processes.is_empty() {
        println!("TAN procedures on offer:");
        for p in &ctx.tan_processes {
            println!("  {} {}", p.number, p.name);
        }
    }
    Ok(())
}

/// Open a business dialog: restore the persisted snapshot, then run the
/// dialog initialization. Without a snapshot the initialization
/// synchronizes on its own first. Every command except sync starts here.
async fn open_dialog(mut ctx: fints_core::ConnectionContext) -> Result<Session> {
    let snapshot = state::read_snapshot(&ctx.bank_code, &ctx.login_id)?;
    ctx.customer_system_id = snapshot.customer_system_id;
    if !snapshot.bank_parameters.is_empty() {
        ctx.bpd = BankParameters::parse(&snapshot.bank_parameters);
    }

    let had_system_id = ctx.customer_system_id.is_some();
    let mut session = Session::new(ctx, Box::new(HttpTransport::new()));
    let mut tx = Transaction::new(Box::new(InitOperation));
    let state = tx.run(&mut session, &StdinTanSource).await?;
    if state != TransactionState::Finished {
        bail!(
            "dialog initialization failed: {}",
            tx.result()
                .map(|r| r.error_summary())
                .unwrap_or_default()
        );
    }
    if !had_system_id {
        let ctx = session.context();
        state::write_snapshot(
            &ctx.bank_code,
            &ctx.login_id,
            &state::Snapshot {
                customer_system_id: ctx.customer_system_id.clone(),
                bank_parameters: ctx.bpd.raw.clone(),
                updated_at_utc: Some(Utc::now().to_rfc3339()),
            },
        )?;
    }
    Ok(session)
}

async fn balance(ctx: fints_core::ConnectionContext) -> Result<()> {
    let mut session = open_dialog(ctx).await?;
    let mut op = BalanceOperation::new();
    let Some(result) = drive(&mut op, &mut session, &StdinTanSource).await? else {
        println!("Cancelled.");
        return Ok(());
    };
    session.end_dialog().await?;
    if !result.is_success() {
        bail!("balance rejected: {}", result.error_summary());
    }

    let balance = op
        .into_balance()
        .context("bank reported no balance segment")?;
    println!("{}", serde_json::to_string_pretty(&balance)?);
    Ok(())
}

async fn statements(
    ctx: fints_core::ConnectionContext,
    format: StatementFormat,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let mut session = open_dialog(ctx).await?;
    let mut op = StatementOperation::new(format, from, to);
    let Some(result) = drive(&mut op, &mut session, &StdinTanSource).await? else {
        println!("Cancelled.");
        return Ok(());
    };
    session.end_dialog().await?;
    if !result.is_success() {
        bail!("statements rejected: {}", result.error_summary());
    }

    eprintln!("({} page(s) received)", op.pages());
    println!("{}", op.payload());
    Ok(())
}

async fn tan_media(ctx: fints_core::ConnectionContext) -> Result<()> {
    let mut session = open_dialog(ctx).await?;
    let mut op = TanMediaOperation::new();
    let Some(result) = drive(&mut op, &mut session, &StdinTanSource).await? else {
        println!("Cancelled.");
        return Ok(());
    };
    session.end_dialog().await?;
    if !result.is_success() {
        bail!("TAN media listing rejected: {}", result.error_summary());
    }

    let media = op.media();
    if media.is_empty() {
        println!("No TAN media registered.");
    } else {
        for name in media {
            println!("{name}");
        }
    }
    Ok(())
}
