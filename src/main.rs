use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};

use filesink::{SerializedSink, SinkConfig};

fn print_usage() {
    eprintln!("Usage: filesink [CONFIG]");
    eprintln!();
    eprintln!("Reads lines from stdin and appends them to rotating log files.");
    eprintln!(
        "CONFIG defaults to {}",
        SinkConfig::default_config_file().display()
    );
}

fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout is left alone for pipelines
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "filesink=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        return Ok(());
    }

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(shellexpand::tilde(path).into_owned()),
        None => SinkConfig::default_config_file(),
    };
    let config = SinkConfig::load(&config_path)?;

    let sink = SerializedSink::open(config.clone())
        .with_context(|| format!("Failed to open sink at {}", config.path))?;
    tracing::info!(
        "Writing to {} (size: {}, time: {:?})",
        config.path,
        config.rotate_size_bytes,
        config.rotate_time
    );

    let records = sink
        .pipe_records(io::stdin().lock())
        .context("Failed to copy stdin into the sink")?;

    sink.close().context("Failed to close sink")?;
    tracing::info!("Wrote {} records", records);

    Ok(())
}
