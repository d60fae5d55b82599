use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;

mod capture;
mod config;
mod contacts;
mod notify;
mod output;
mod records;
mod remind;
mod telemetry;
mod util;

#[cfg(test)]
mod test_support;

#[derive(Parser)]
#[command(name = "survei", about = "Survey recruitment capture and WhatsApp reminders")]
struct Cli {
    /// Directory holding the record store (overrides SURVEI_OUTPUT_DIR)
    #[arg(global = true, long)]
    output_dir: Option<PathBuf>,
    /// Emit a single JSON envelope to stdout; logs go to stderr
    #[arg(global = true, long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Capture(capture::CaptureCmd),
    Remind(remind::RemindCmd),
    Contacts(contacts::ContactsCmd),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // initialize logging/tracing (stderr). Respect RUST_LOG and SURVEI_LOG_FORMAT
    telemetry::config::init_tracing();
    let cfg = config::AppConfig::from_env(cli.output_dir)?;

    match cli.command {
        Commands::Capture(args) => capture::run(&cfg, args).await?,
        Commands::Remind(args) => remind::run(&cfg, args).await?,
        Commands::Contacts(args) => contacts::run(&cfg, args)?,
    }

    Ok(())
}
