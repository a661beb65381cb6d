//! SurtLand CLI - land-cover compositing features and change analytics

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use surtland_algorithms::change::{
    build_matrix, transition_table, ChangeReportAssembler, ReportConfig,
};
use surtland_algorithms::imagery::{normalized_difference, spectral_index, SpectralIndex};
use surtland_algorithms::texture::{texture, GlcmFeature, GlcmParams};
use surtland_core::io::{read_geotiff, write_geotiff, GeoTiffOptions};
use surtland_core::{ClassificationRaster, Raster, Region};
use surtland_parallel::{ExecutionContext, ProcessingMode};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "surtland")]
#[command(author, version, about = "Land-cover compositing, features and change analytics", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads (default: all cores)
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Normalized-difference index of two bands
    Index {
        /// Input multi-band raster
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Named index: ndvi, ndwi, mndwi, nbr (overrides --a/--b)
        #[arg(short, long)]
        index: Option<String>,
        /// Positive band
        #[arg(short, long, default_value = "B8")]
        a: String,
        /// Negative band
        #[arg(short, long, default_value = "B4")]
        b: String,
        /// Output band name
        #[arg(short, long, default_value = "ND")]
        name: String,
    },
    /// GLCM texture features
    Texture {
        /// Input multi-band raster
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Comma-separated bands
        #[arg(short, long, default_value = "B8")]
        bands: String,
        /// Window radius in cells
        #[arg(short, long, default_value = "1")]
        radius: usize,
        /// Gray levels
        #[arg(short, long, default_value = "32")]
        levels: usize,
        /// Comma-separated features (asm, contrast, corr, var, idm, savg, svar, sent, ent, dvar, dent, diss, imcorr1, imcorr2)
        #[arg(short, long)]
        features: Option<String>,
    },
    /// Land-cover change report between two classifications
    ChangeReport {
        /// Earlier classification
        t1: PathBuf,
        /// Later classification
        t2: PathBuf,
        /// Report configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,
        /// Study area as min_x,min_y,max_x,max_y in the raster CRS
        #[arg(long)]
        bbox: Option<String>,
        /// Write the report as JSON
        #[arg(short, long)]
        json: Option<PathBuf>,
        /// Write forest-loss hotspot intensity raster
        #[arg(long)]
        hotspots: Option<PathBuf>,
    },
    /// From/to transition area table (hectares)
    TransitionTable {
        /// Earlier classification
        t1: PathBuf,
        /// Later classification
        t2: PathBuf,
        /// Report configuration (TOML) providing class names
        #[arg(short, long)]
        config: PathBuf,
        /// Study area as min_x,min_y,max_x,max_y in the raster CRS
        #[arg(long)]
        bbox: Option<String>,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster> {
    let pb = spinner("Reading raster...");
    let raster = read_geotiff(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}, {} band(s)", raster.cols(), raster.rows(), raster.band_count());
    Ok(raster)
}

fn read_classification(path: &Path) -> Result<ClassificationRaster> {
    ClassificationRaster::new(read_raster(path)?)
        .with_context(|| format!("{} is not a single-band classification", path.display()))
}

fn write_result(raster: &Raster, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, Some(GeoTiffOptions::default())).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn read_config(path: &Path) -> Result<ReportConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ReportConfig = toml::from_str(&text).context("Invalid report configuration")?;
    config.validate().context("Invalid report configuration")?;
    Ok(config)
}

fn parse_bbox(s: Option<&str>) -> Result<Region> {
    let Some(s) = s else {
        return Ok(Region::Extent);
    };
    let v: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().with_context(|| format!("Invalid bbox value: {}", p)))
        .collect::<Result<_>>()?;
    if v.len() != 4 || v[0] >= v[2] || v[1] >= v[3] {
        anyhow::bail!("bbox must be min_x,min_y,max_x,max_y, got: {}", s);
    }
    Ok(Region::rectangle(v[0], v[1], v[2], v[3]))
}

fn parse_features(s: Option<&str>) -> Result<Vec<GlcmFeature>> {
    match s {
        None => Ok(GlcmFeature::ALL.to_vec()),
        Some(s) => s
            .split(',')
            .map(|f| GlcmFeature::from_suffix(f).map_err(anyhow::Error::from))
            .collect(),
    }
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let ctx = match cli.threads {
        Some(n) => ExecutionContext::default().with_mode(ProcessingMode::ParallelWith(n)),
        None => ExecutionContext::default(),
    };

    match cli.command {
        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Geotransform: {:?}", raster.transform().to_gdal());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            println!("\nBands:");
            for name in raster.band_names() {
                let stats = raster.statistics(name)?;
                println!(
                    "  {:<12} valid {:>8} ({:.1}%)  min {:>10.4}  max {:>10.4}  mean {:>10.4}",
                    name,
                    stats.valid_count,
                    100.0 * stats.valid_count as f64 / raster.len().max(1) as f64,
                    stats.min.unwrap_or(f64::NAN),
                    stats.max.unwrap_or(f64::NAN),
                    stats.mean.unwrap_or(f64::NAN),
                );
            }
        }

        Commands::Index {
            input,
            output,
            index,
            a,
            b,
            name,
        } => {
            let raster = read_raster(&input)?;
            let start = Instant::now();
            let result = match index {
                Some(index) => spectral_index(&raster, SpectralIndex::from_name(&index)?),
                None => normalized_difference(&raster, &a, &b, &name),
            }
            .context("Failed to calculate index")?;
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done("Index", &output, elapsed);
        }

        Commands::Texture {
            input,
            output,
            bands,
            radius,
            levels,
            features,
        } => {
            let raster = read_raster(&input)?;
            let bands: Vec<&str> = bands.split(',').map(str::trim).collect();
            let params = GlcmParams {
                radius,
                n_levels: levels,
                features: parse_features(features.as_deref())?,
                ..Default::default()
            };
            let start = Instant::now();
            let result = texture(&raster, &bands, &params, &ctx).context("Failed to calculate texture")?;
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done("Texture", &output, elapsed);
        }

        Commands::ChangeReport {
            t1,
            t2,
            config,
            bbox,
            json,
            hotspots,
        } => {
            let config = read_config(&config)?;
            let region = parse_bbox(bbox.as_deref())?;
            let t1 = read_classification(&t1)?;
            let t2 = read_classification(&t2)?;
            let assembler = ChangeReportAssembler::new(&t1, &t2, &config, &region);

            let start = Instant::now();
            let report = assembler.assemble(&ctx).context("Failed to assemble change report")?;
            let text = serde_json::to_string_pretty(&report.to_presentation())?;
            info!("Report assembled in {:.2?}", start.elapsed());

            match json {
                Some(path) => {
                    std::fs::write(&path, &text).with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Report saved to: {}", path.display());
                }
                None => println!("{}", text),
            }

            if let Some(path) = hotspots {
                let start = Instant::now();
                let intensity = assembler
                    .hotspots(config.hotspot_radius_m, &ctx)
                    .context("Failed to compute hotspots")?;
                let elapsed = start.elapsed();
                write_result(&intensity, &path)?;
                done("Hotspot intensity", &path, elapsed);
            }
        }

        Commands::TransitionTable { t1, t2, config, bbox } => {
            let config = read_config(&config)?;
            let region = parse_bbox(bbox.as_deref())?;
            let t1 = read_classification(&t1)?;
            let t2 = read_classification(&t2)?;

            let matrix = build_matrix(&t1, &t2).context("Failed to build transition matrix")?;
            let table = transition_table(&matrix, &config.class_names(), &region, &ctx)?;

            let width = table.classes.iter().map(String::len).max().unwrap_or(4).max(10);
            print!("{:<width$}", "from \\ to", width = width);
            for name in &table.classes {
                print!(" {:>width$}", name, width = width);
            }
            println!();
            for (name, row) in table.classes.iter().zip(&table.hectares) {
                print!("{:<width$}", name, width = width);
                for v in row {
                    print!(" {:>width$.2}", v, width = width);
                }
                println!();
            }
            println!("Total: {:.2} ha", table.total());
        }
    }

    Ok(())
}
