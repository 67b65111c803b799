use anyhow::Result;
use clap::Parser;
use class_version_patcher::cli::{Cli, OutputFormat};
use class_version_patcher::config::PatchConfig;
use class_version_patcher::dispatch::Patcher;
use class_version_patcher::version::remap;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();
    let cli = parse_cli();
    let config = PatchConfig::resolve(&cli)?;

    let rule = remap(config.from_major, config.to_major, config.minor);
    let mut patcher = Patcher::new(rule, config.allow_directories);
    let entries = patcher.validate(&config.paths)?;
    let report = patcher.patch_all(&entries)?;

    match config.format {
        OutputFormat::Text => println!("OK"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

/// Parses arguments, exiting with code 1 on usage errors.
fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
