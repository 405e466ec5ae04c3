use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use pollster::block_on;

#[cfg(not(target_arch = "wasm32"))]
use crystal_ring::app::{print_summary, run_headless, run_window, WindowInitError};
use crystal_ring::{init_logging, CrystalAssets, DirectorySource, LoggingConfig, SketchConfig};

const DEFAULT_FRAMES: u32 = 60;

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let config = match &options.config {
        Some(path) => {
            let xml = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            SketchConfig::from_xml(&xml)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => SketchConfig::default(),
    };
    init_logging(LoggingConfig::with_filter(config.log_filter.clone()));

    if !options.asset_dir.is_dir() {
        bail!("asset directory {} does not exist", options.asset_dir.display());
    }
    let source = DirectorySource::new(&options.asset_dir);
    let assets = block_on(CrystalAssets::load(&source, &config.asset_paths()))
        .with_context(|| format!("failed to load assets from {}", options.asset_dir.display()))?;
    println!(
        "Loaded {} crystal geometries from {}",
        assets.geometries.len(),
        options.asset_dir.display()
    );

    if options.summary_only {
        return summarize(config, assets, options.frames);
    }
    match run_window(config.clone(), assets.clone()) {
        Ok(()) => Ok(()),
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!(
                "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
            );
            summarize(config, assets, options.frames)
        }
        Err(err) => Err(err),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn summarize(config: SketchConfig, assets: CrystalAssets, frames: u32) -> Result<()> {
    let run = run_headless(config, assets, frames)?;
    print_summary(&run);
    Ok(())
}

#[derive(Debug, PartialEq)]
struct CliOptions {
    asset_dir: PathBuf,
    config: Option<PathBuf>,
    summary_only: bool,
    frames: u32,
}

impl CliOptions {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let Some(asset_dir) = args.next() else {
            return Err(anyhow!(
                "Usage: crystal-ring <asset-dir> [--config FILE] [--summary-only] [--frames N]"
            ));
        };
        let mut options = Self {
            asset_dir: PathBuf::from(asset_dir),
            config: None,
            summary_only: false,
            frames: DEFAULT_FRAMES,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => options.summary_only = true,
                "--config" => {
                    let path = args.next().ok_or_else(|| anyhow!("--config needs a file"))?;
                    options.config = Some(PathBuf::from(path));
                }
                "--frames" => {
                    let value = args.next().ok_or_else(|| anyhow!("--frames needs a count"))?;
                    options.frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count {value:?}"))?;
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --config, --summary-only or --frames"
                    ));
                }
            }
        }
        Ok(options)
    }
}
