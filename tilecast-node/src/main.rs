//! tilecast capture node entry point.
//!
//! ```text
//! tilecast-node                  Run in the foreground until Ctrl-C
//! tilecast-node --config <path>  Load a custom config TOML
//! tilecast-node --frames <n>     Stop after n snapshots
//! tilecast-node --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tilecast_node::config::NodeConfig;
use tilecast_node::node::CaptureNode;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tilecast-node", about = "tilecast tile-delta capture node")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "tilecast-node.toml")]
    config: PathBuf,

    /// Stop after this many snapshots have been published.
    #[arg(long)]
    frames: Option<u64>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&NodeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = NodeConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("tilecast-node v{}", env!("CARGO_PKG_VERSION"));
    info!("camera: {}x{} @ {} fps", config.camera.width, config.camera.height, config.camera.fps);
    info!(
        "delta thresholds: pixel {} / tile {} / max age {} ms",
        config.delta.per_pixel_threshold, config.delta.per_tile_threshold, config.delta.max_tile_age_ms
    );

    let node = CaptureNode::new(config);
    let stop = node.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    let summary = node.run(cli.frames).await?;
    info!(
        "done: {} snapshots, {} region updates, {} bytes",
        summary.snapshots, summary.updates, summary.encoded_bytes
    );

    Ok(())
}
