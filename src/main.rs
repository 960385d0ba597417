use clap::Parser;
use env_logger::Env;
use fire_perimeter::cli::Args;
use fire_perimeter::config::PipelineConfig;
use fire_perimeter::error::Result;
use fire_perimeter::{io, Pipeline};
use log::info;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("=== Fire Perimeter ===");

    // Set thread pool size if specified
    if let Some(n_threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()?;
        info!("Using {} threads", n_threads);
    } else {
        info!("Using all available threads");
    }

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    args.apply(&mut config);
    let pipeline = Pipeline::new(config)?;

    if args.stats_only {
        let (band, metadata) = io::read_thermal_band(&args.input)?;
        let (threshold, stats) = pipeline.threshold(&band, &metadata)?;
        info!(
            "Threshold {}: {} of {} pixels classified hot (band mean {:.2})",
            threshold,
            stats.count_at_or_above(threshold),
            stats.count,
            stats.mean
        );
        return Ok(());
    }

    let output = pipeline.run(&args.input)?;
    info!(
        "Threshold {}: {} detections -> {} merged -> {} final polygons",
        output.threshold,
        output.detections.len(),
        output.aggregated.len(),
        output.shrunk.len()
    );
    for path in &output.written {
        info!("  wrote {}", path.display());
    }

    info!("=== Done! ===");
    Ok(())
}
