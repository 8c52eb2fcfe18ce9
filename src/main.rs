mod angle;
mod catalog;
mod config;
mod ephemeris;
mod mount;
mod observation;
mod planner;
mod scheduler;
mod target;
mod tracker;

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::catalog::{ManualCatalog, TargetCatalog, TleCatalog};
use crate::config::Config;
use crate::ephemeris::TleEphemeris;
use crate::mount::{MountConnection, MountController, MountPosition};
use crate::observation::{MeasurementSeries, PointingOnly, PostPipeline, PostStage};
use crate::planner::{AutoSolver, GridMapping, PathStrategy, RoutePlanner};
use crate::scheduler::{BatchMeasurement, BatchScheduler};
use crate::target::Target;
use crate::tracker::Tracker;

type BoxError = Box<dyn Error>;

#[derive(Parser)]
#[command(name = "track-o-mat")]
#[command(about = "Batch observation with a two-axis antenna mount")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate { config: String },
    /// Print the current visiting order
    Plan { config: String },
    /// Run the batch observation
    Run { config: String },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Plan { config } => plan(&config),
        Commands::Run { config } => run(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load(path: &str) -> Result<Config, BoxError> {
    let config = Config::from_file(path)?;
    config.validate()?;
    Ok(config)
}

fn validate(path: &str) -> Result<(), BoxError> {
    let config = load(path)?;
    println!("Configuration is valid");
    println!("  mount: {} (stow {})", config.mount.address, config.mount.stow);
    if config.is_manual() {
        println!("  targets: {} manual positions", config.manual_positions()?.len());
    } else if config.targets.names.is_empty() {
        println!("  targets: {}", config.targets.categories.join(", "));
    } else {
        println!("  targets: {}", config.targets.names.join(", "));
    }
    match (&config.measurement.frequencies, &config.measurement.bands) {
        (Some(mhz), _) => println!("  frequencies: {:?} MHz", mhz),
        (None, Some(bands)) => {
            for (category, list) in bands {
                println!("  bands {}: {}", category, list.join(", "));
            }
        }
        (None, None) => {}
    }
    println!(
        "  scan time: {}, lap interval: {}",
        humantime::format_duration(config.schedule.scan_time),
        humantime::format_duration(config.schedule.lap_interval)
    );
    Ok(())
}

fn connect(config: &Config) -> Result<Arc<MountController>, BoxError> {
    log::info!("Connecting to mount at {}", config.mount.address);
    let link = MountConnection::connect(config.mount.address.as_str())?;
    let mount = MountController::new(
        Box::new(link),
        config.mount.min_azimuth,
        config.mount.min_elevation,
        config.mount.stow,
        config.mount.close_enough,
    )?;
    Ok(Arc::new(mount))
}

/// The catalog plus the categories and names to load from it.
fn catalog(config: &Config) -> Result<(Arc<dyn TargetCatalog>, Vec<String>, Vec<String>), BoxError> {
    if config.is_manual() {
        let positions = config.manual_positions()?;
        let catalog = Arc::new(ManualCatalog::new(&positions)?);
        return Ok((catalog, Vec::new(), positions));
    }

    let dir = config
        .targets
        .tle_dir
        .as_deref()
        .ok_or("targets.tle_dir is not set")?;
    let ephemeris = TleEphemeris::from_dir(config.station.ground_station(), dir)?;
    log::info!(
        "Loaded {} satellites from {}",
        ephemeris.names().count(),
        dir.display()
    );
    let names = config.targets.names.clone();
    // explicit names replace the categories
    let categories = if names.is_empty() {
        config.targets.categories.clone()
    } else {
        Vec::new()
    };
    Ok((Arc::new(TleCatalog::new(Arc::new(ephemeris))), categories, names))
}

fn strategy(config: &Config, mount: &Arc<MountController>) -> Result<Box<dyn PathStrategy>, BoxError> {
    let (catalog, categories, names) = catalog(config)?;

    if let Some(grid) = &config.targets.grid {
        let reference = catalog.load_target(&grid.target)?;
        log::info!(
            "Mapping {} on a {}x{} grid",
            reference.name(),
            grid.rows,
            grid.cols
        );
        return Ok(Box::new(GridMapping::new(
            reference,
            grid.rows,
            grid.cols,
            grid.row_step,
            grid.col_step,
        )));
    }

    Ok(Box::new(
        RoutePlanner::new(
            catalog,
            Arc::new(MountPosition(mount.clone())),
            mount.clone(),
            config.planner.elevation_cutoff,
            config.planner.max_batch_size,
        )
        .with_categories(categories)
        .with_names(names)
        .with_solver(Box::new(AutoSolver {
            exact_limit: config.planner.exact_solver_limit,
        })),
    ))
}

fn plan(path: &str) -> Result<(), BoxError> {
    let config = load(path)?;
    let mount = connect(&config)?;
    let result = strategy(&config, &mount).and_then(|mut strategy| {
        let (order, length) = strategy.find_optimal_path(true)?;
        println!(
            "Visiting order ({} targets, {:.1} deg):",
            order.len(),
            length.to_degrees()
        );
        for (i, target) in order.iter().enumerate() {
            println!("  {}: {}", i + 1, target);
        }
        Ok(())
    });
    mount.terminate()?;
    result
}

fn run(path: &str) -> Result<(), BoxError> {
    let config = load(path)?;
    let mount = connect(&config)?;
    let strategy = strategy(&config, &mount)?;

    let series = Arc::new(MeasurementSeries::create(&config.output.data_dir)?);
    let post = PostPipeline::builder()
        .then(PostStage::RemoveRfi)?
        .then(PostStage::DecimateChannels(config.measurement.channels))?
        .then(PostStage::SaveSpectrum(config.output.data_dir.clone()))?
        .then(PostStage::RecordObservation(series))?
        .then(PostStage::Summary)?
        .build();

    let settings = config.schedule_settings();
    let tracker = Tracker::new(
        mount.clone(),
        Target::fixed("Stow", mount.stow()),
        config.measurement.offset,
    )
    .with_interval(config.mount.update_interval);
    let factory = PointingOnly::new(mount.clone(), config.measurement.integration);
    let batch = BatchMeasurement::new(
        tracker,
        config.frequency_plan(),
        config.measurement_settings(),
        post,
        Box::new(factory),
        &settings,
    );

    let mut scheduler = BatchScheduler::new(strategy, batch, settings);
    scheduler.run()?;
    Ok(())
}
