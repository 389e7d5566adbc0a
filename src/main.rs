//! WSI Pyramid - tile and region extraction for pyramidal images.
//!
//! This binary wires the raster decoder into a tile service and runs one
//! subcommand against it.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use image::RgbImage;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_pyramid::{
    backend::RasterSource,
    config::{Cli, Command, Config, RegionArgs, TileArgs, WarmArgs},
    tile::{TileOrigin, TileService},
};

#[tokio::main]
async fn main() -> ExitCode {
    let (command, config) = Cli::parse().into_parts();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    debug!(
        tile_cache_mb = config.tile_cache_mb,
        image_cache = config.image_cache,
        level_ratio = config.level_ratio,
        max_native_levels = config.max_native_levels,
        tile_hint = config.tile_hint,
        "configuration"
    );

    let result = match command {
        Command::Info { path } => run_info(&config, &path).await,
        Command::Tile(args) => run_tile(&config, args).await,
        Command::Region(args) => run_region(&config, args).await,
        Command::Warm(args) => run_warm(&config, args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_pyramid=debug"
    } else {
        "wsi_pyramid=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn path_str(path: &Path) -> Result<&str, String> {
    path.to_str()
        .ok_or_else(|| format!("path is not valid UTF-8: {}", path.display()))
}

fn save_png(path: &Path, width: u32, height: u32, data: Vec<u8>) -> Result<(), String> {
    let image = RgbImage::from_raw(width, height, data)
        .ok_or_else(|| format!("pixel buffer does not match {}x{}", width, height))?;
    image
        .save(path)
        .map_err(|e| format!("failed to write {}: {}", path.display(), e))
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: &Config, path: &Path) -> Result<(), String> {
    let service = config.tile_service();
    let descriptor = service
        .pyramid(path_str(path)?)
        .await
        .map_err(|e| e.to_string())?;

    let json = serde_json::to_string_pretty(&descriptor).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

// =============================================================================
// Tile Command
// =============================================================================

async fn run_tile(config: &Config, args: TileArgs) -> Result<(), String> {
    let service = config.tile_service();
    let response = service
        .get_tile(path_str(&args.path)?, args.resolution, args.tile)
        .await
        .map_err(|e| e.to_string())?;

    let record = response.record;
    save_png(&args.output, record.width(), record.height(), record.data().to_vec())?;

    info!(
        resolution = args.resolution,
        tile = args.tile,
        width = record.width(),
        height = record.height(),
        origin = ?response.origin,
        output = %args.output.display(),
        "tile written"
    );
    Ok(())
}

// =============================================================================
// Region Command
// =============================================================================

async fn run_region(config: &Config, args: RegionArgs) -> Result<(), String> {
    let service = config.tile_service();
    let buffer = service
        .get_region(
            path_str(&args.path)?,
            args.resolution,
            args.x,
            args.y,
            args.width,
            args.height,
        )
        .await
        .map_err(|e| e.to_string())?;

    save_png(&args.output, buffer.width, buffer.height, buffer.data)?;

    info!(
        resolution = args.resolution,
        width = args.width,
        height = args.height,
        output = %args.output.display(),
        "region written"
    );
    Ok(())
}

// =============================================================================
// Warm Command
// =============================================================================

async fn run_warm(config: &Config, args: WarmArgs) -> Result<(), String> {
    let service: Arc<TileService<RasterSource>> = Arc::new(config.tile_service());
    let path = path_str(&args.path)?.to_string();

    let descriptor = service.pyramid(&path).await.map_err(|e| e.to_string())?;
    let resolution = args
        .resolution
        .unwrap_or_else(|| descriptor.num_resolutions() - 1);
    let level = *descriptor.level(resolution).map_err(|e| e.to_string())?;

    info!(
        resolution,
        tiles = level.tile_count(),
        width = level.width,
        height = level.height,
        "warming tiles"
    );

    let started = Instant::now();
    let mut handles = Vec::with_capacity(level.tile_count() as usize);
    for tile in 0..level.tile_count() {
        let service = Arc::clone(&service);
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            service.get_tile(&path, resolution, tile).await
        }));
    }

    let (mut native, mut composed, mut cached) = (0usize, 0usize, 0usize);
    for handle in handles {
        let response = handle
            .await
            .map_err(|e| format!("tile task failed: {}", e))?
            .map_err(|e| e.to_string())?;
        match response.origin {
            TileOrigin::Native => native += 1,
            TileOrigin::Composed => composed += 1,
            TileOrigin::Cache => cached += 1,
        }
    }

    let stats = service.cache_stats().await;
    info!(
        native,
        composed,
        cached,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "warm complete"
    );

    let json = serde_json::to_string_pretty(&stats).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}
