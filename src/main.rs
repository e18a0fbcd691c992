use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sonobox::app;
use sonobox::cli::Args;
use sonobox::config::AppConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = AppConfig::load_or_default(&args.config);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_ctrlc = stop.clone();
    ctrlc::set_handler(move || {
        stop_for_ctrlc.store(true, Ordering::SeqCst);
    })?;

    info!(play = args.play, wav = ?args.wav, seed = args.seed_count, "starting");
    app::run(&args, &cfg, stop)
}
