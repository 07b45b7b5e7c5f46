use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use cityscene_core::config::{HeightStatistic, StridePolicy, VegetationOutput};
use cityscene_core::pipeline::{log_summary, run};
use cityscene_core::PipelineConfig;

/// Starting point for the configuration before file and flag overrides.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Preset {
    /// Built-in defaults.
    Default,
    /// Whole tile: max height, 0.5 m simplification, vegetation boxes.
    FullTile,
    /// Campus crop: 90th percentile, thinned vegetation points in GeoJSON.
    Campus,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmitVegetation {
    Solids,
    Points,
    Both,
    None,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "cityscene", version, about = "LOD1 CityJSON scenes from DSM/DTM rasters and footprints")]
struct Args {
    /// JSON configuration file; replaces the preset entirely.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    preset: Preset,
    /// Print the effective configuration as JSON and exit.
    #[arg(long, default_value_t = false)]
    dump_config: bool,

    #[arg(long)]
    dsm: Option<PathBuf>,
    #[arg(long)]
    dtm: Option<PathBuf>,
    #[arg(long)]
    footprints: Option<PathBuf>,
    /// CityJSON output (gzip when the name ends in .gz)
    #[arg(long)]
    output: Option<PathBuf>,
    /// GeoJSON vegetation point layer
    #[arg(long)]
    vegetation_output: Option<PathBuf>,
    #[arg(long)]
    epsg: Option<u32>,

    /// Minimum building height in metres (inclusive)
    #[arg(long)]
    min_building_height: Option<f64>,
    /// Use this percentile of the nDSM instead of the maximum
    #[arg(long)]
    height_percentile: Option<f64>,
    #[arg(long)]
    simplify: Option<f64>,

    /// Minimum vegetation height in metres (exclusive)
    #[arg(long)]
    min_vegetation_height: Option<f64>,
    /// Fixed vegetation stride
    #[arg(long, conflicts_with = "max_vegetation")]
    stride: Option<usize>,
    /// Vegetation object ceiling; the stride is derived from it
    #[arg(long)]
    max_vegetation: Option<usize>,
    /// Minimum distance between vegetation points in metres
    #[arg(long)]
    min_separation: Option<f64>,
    #[arg(long, value_enum)]
    emit_vegetation: Option<EmitVegetation>,

    #[arg(long)]
    cityjson_version: Option<String>,
    /// Worker threads for footprint sampling (default: all cores)
    #[arg(long)]
    threads: Option<usize>,
}

fn effective_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => match args.preset {
            Preset::Default => PipelineConfig::default(),
            Preset::FullTile => PipelineConfig::full_tile(),
            Preset::Campus => PipelineConfig::campus(),
        },
    };

    if let Some(p) = &args.dsm {
        config.dsm_path = p.clone();
    }
    if let Some(p) = &args.dtm {
        config.dtm_path = p.clone();
    }
    if let Some(p) = &args.footprints {
        config.footprints_path = p.clone();
    }
    if let Some(p) = &args.output {
        config.cityjson_output = Some(p.clone());
    }
    if let Some(p) = &args.vegetation_output {
        config.geojson_output = Some(p.clone());
    }
    if let Some(epsg) = args.epsg {
        config.target_epsg = epsg;
    }
    if let Some(h) = args.min_building_height {
        config.buildings.min_height = h;
    }
    if let Some(q) = args.height_percentile {
        config.buildings.height_statistic = HeightStatistic::Percentile { q };
    }
    if let Some(tol) = args.simplify {
        config.buildings.simplify_tolerance = Some(tol);
    }
    if let Some(h) = args.min_vegetation_height {
        config.vegetation.min_height = h;
    }
    if let Some(step) = args.stride {
        config.vegetation.stride = StridePolicy::Fixed { step };
    }
    if let Some(max) = args.max_vegetation {
        config.vegetation.stride = StridePolicy::MaxObjects { max };
    }
    if let Some(d) = args.min_separation {
        config.vegetation.min_separation = Some(d);
    }
    match args.emit_vegetation {
        Some(EmitVegetation::Solids) => config.vegetation.emit = VegetationOutput::Solids,
        Some(EmitVegetation::Points) => config.vegetation.emit = VegetationOutput::Points,
        Some(EmitVegetation::Both) => config.vegetation.emit = VegetationOutput::Both,
        Some(EmitVegetation::None) => config.vegetation.enabled = false,
        None => {}
    }
    if let Some(v) = &args.cityjson_version {
        config.output.cityjson_version = v.clone();
    }
    if let Some(n) = args.threads {
        config.threads = Some(n);
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = effective_config(&args)?;

    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let threads = config.threads.unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("initialising the worker pool")?;
    info!("Using {} worker threads", threads);

    let started = Instant::now();
    let summary = run(&config).context("scene generation failed")?;
    log_summary(&summary);
    info!("Done in {:.1}s", started.elapsed().as_secs_f64());
    Ok(())
}
