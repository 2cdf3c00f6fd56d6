use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{self, WrapErr};

use strike_engine::EngineConfig;
use strike_offline::run_file;

/// Replay a Y4M capture through the strike vision core.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Input video file (Y4M, 4:2:0 planar).
    input: PathBuf,

    /// Engine configuration bundle (YAML). Defaults are used when
    /// omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dump the telemetry ring as CSV into this directory at end of run.
    #[arg(long)]
    dump_telemetry: Option<PathBuf>,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let cfg: EngineConfig = match &cli.config {
        Some(path) => {
            let f = std::fs::File::open(path)
                .wrap_err_with(|| format!("opening config {}", path.display()))?;
            serde_yaml::from_reader(f)
                .wrap_err_with(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    let summary = run_file(&cli.input, cfg, cli.dump_telemetry.as_deref())?;

    tracing::info!(
        "processed {} frames, {} dots, {} shot records",
        summary.frames,
        summary.dots_total,
        summary.records.len()
    );
    for record in &summary.records {
        tracing::info!(
            "shot {}: final={} refused={} peak={:?} start={:.4} end={:.4}",
            record.shot_id,
            record.final_state,
            record.refused,
            record.peak_speed_px_s,
            record.start_ts,
            record.end_ts
        );
    }
    if let Some(path) = &summary.telemetry_path {
        tracing::info!("telemetry written to {}", path.display());
    }

    Ok(())
}
