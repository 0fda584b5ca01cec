use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::{Datelike, Local, Weekday};
use tracing::info;

use crate::bus::{MessageBus, SpoolBus};
use crate::config::AppConfig;
use crate::diagnostics::tracing_diagnostics;
use crate::fanout::{Consumer, Producer, TenantProcessor};
use crate::mail::SmtpMailerFactory;
use crate::pipeline::ReportPipeline;
use crate::render::HandlebarsRenderer;
use crate::store::FileTenantStore;
use crate::tracking::azure::AzureDevOpsFactory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Produce { force: bool },
    Consume,
    Run { force: bool },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub config: Option<PathBuf>,
    pub command: Command,
}

/// Parse everything after the program name.
///
/// Supported forms:
///   squad-report produce [--force]
///   squad-report consume
///   squad-report run [--force]
///   squad-report --config <path> <command>
pub fn parse_args(args: &[String]) -> Result<Cli> {
    let mut config = None;
    let mut force = false;
    let mut command = None;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                i += 1;
                match args.get(i) {
                    Some(path) => config = Some(PathBuf::from(path)),
                    None => bail!("Missing value for --config flag"),
                }
            }
            "-f" | "--force" => force = true,
            "-h" | "--help" | "help" => command = Some("help"),
            "produce" | "consume" | "run" if command.is_none() => {
                command = Some(args[i].as_str());
            }
            other => bail!("Unexpected argument '{other}'\n\nRun `squad-report help` for usage."),
        }
        i += 1;
    }

    let command = match command {
        Some("produce") => Command::Produce { force },
        Some("consume") => Command::Consume,
        Some("run") => Command::Run { force },
        _ => Command::Help,
    };
    if force && matches!(command, Command::Consume) {
        bail!("--force only applies to produce and run");
    }

    Ok(Cli { config, command })
}

/// Reports are not produced on Saturdays and Sundays unless forced.
pub fn should_skip(day: Weekday, skip_weekends: bool, force: bool) -> bool {
    skip_weekends && !force && matches!(day, Weekday::Sat | Weekday::Sun)
}

pub async fn handle(command: Command, config: &AppConfig) -> Result<()> {
    let bus: Arc<dyn MessageBus> = Arc::new(SpoolBus::new(&config.bus.spool_dir));
    match command {
        Command::Produce { force } => handle_produce(config, bus, force).await,
        Command::Consume => handle_consume(config, bus).await,
        Command::Run { force } => {
            produce_then_consume(
                handle_produce(config, bus.clone(), force),
                handle_consume(config, bus),
            )
            .await
        }
        Command::Help => {
            print_help();
            Ok(())
        }
    }
}

/// Consume runs even when some publishes failed, so tenants that did make
/// it onto the bus still get their report. Either failure fails the whole.
async fn produce_then_consume<P, C>(produce: P, consume: C) -> Result<()>
where
    P: Future<Output = Result<()>>,
    C: Future<Output = Result<()>>,
{
    let produced = produce.await;
    let consumed = consume.await;
    match (produced, consumed) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
        (Err(produce), Err(consume)) => Err(anyhow!(
            "produce failed: {produce:#}; consume failed: {consume:#}"
        )),
    }
}

async fn handle_produce(config: &AppConfig, bus: Arc<dyn MessageBus>, force: bool) -> Result<()> {
    let today = Local::now().weekday();
    if should_skip(today, config.schedule.skip_weekends, force) {
        info!(%today, "weekend, no reports produced");
        return Ok(());
    }

    let store = Arc::new(FileTenantStore::new(&config.store.tenants_path));
    let published = Producer::new(store, bus, tracing_diagnostics())
        .produce()
        .await?;
    println!("Published {published} report request(s)");
    Ok(())
}

async fn handle_consume(config: &AppConfig, bus: Arc<dyn MessageBus>) -> Result<()> {
    let messages = bus.receive().await?;
    if messages.is_empty() {
        println!("No report requests pending");
        return Ok(());
    }

    let diagnostics = tracing_diagnostics();
    let tracking = Arc::new(AzureDevOpsFactory::new(
        config.tracking.clone(),
        config.browser.clone(),
    ));
    let pipeline = ReportPipeline::new(
        tracking,
        Arc::new(HandlebarsRenderer::new()?),
        diagnostics.clone(),
    );
    let processor = TenantProcessor::new(pipeline, Arc::new(SmtpMailerFactory));
    let sent = Consumer::new(processor, diagnostics)
        .consume(messages)
        .await?;
    println!("Sent {sent} report(s)");
    Ok(())
}

pub fn print_help() {
    println!("squad-report: daily sprint reports by email\n");
    println!("USAGE:");
    println!("  squad-report [--config <path>] <command>");
    println!();
    println!("COMMANDS:");
    println!("  produce [--force]  Queue one report request per active tenant");
    println!("  consume            Build and mail every queued report");
    println!("  run [--force]      produce, then consume");
    println!("  help               Show this message");
    println!();
    println!("OPTIONS:");
    println!("  -c, --config <path>  Config file (default: $SQUAD_REPORT_CONFIG or ~/.squad-report/config.toml)");
    println!("  -f, --force          Produce even on weekends");
}
