use anyhow::{Context, Result};
use basin_route::config::{ColumnConfig, OutputFormat};
use basin_route::forcing::StepForcing;
use basin_route::io;
use basin_route::io::results::{OutputColumns, SimulationResults};
use basin_route::network::{self, NetworkTopology};
use basin_route::params::apply_adjustments;
use basin_route::point_source::PointSources;
use basin_route::routing::Simulation;
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use std::io::Write;

mod cli;

use cli::{RunConfig, get_args};

fn init_logger(level: Option<&str>) {
    let level = level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| std::env::var("RUST_LOG").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5}] {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}

fn main() -> Result<()> {
    let config = get_args()?;
    init_logger(config.log_level.as_deref());
    if !cfg!(feature = "netcdf") && config.output_format != OutputFormat::Csv {
        anyhow::bail!("NetCDF output requested but basin_route was built without the `netcdf` feature");
    }

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build_global()
        .context("Failed to build worker pool")?;

    let simulation = build_simulation(&config)?;
    let steps = load_forcing(&config, simulation.reach_count())?;

    log::info!("Simulation configuration:");
    log::info!(
        "  period: {} + {} steps of {} s",
        simulation.time(),
        steps.len(),
        config.dt
    );
    log::info!("  reaches: {}", simulation.reach_count());
    log::info!("  layers: {}", simulation.topology().layers.len());
    log::info!("  worker threads: {}", config.threads);

    run(simulation, &steps, &config)
}

fn build_simulation(config: &RunConfig) -> Result<Simulation> {
    let mut reaches = match &config.sqlite {
        Some(db_path) => {
            let conn = rusqlite::Connection::open(db_path)
                .with_context(|| format!("Failed to open database: {:?}", db_path))?;
            network::load_reach_parameters(&conn, &ColumnConfig::new())
                .context("Failed to read reach table")?
        }
        None => io::csv::load_reaches(&config.input("reaches.csv"))?,
    };

    if let Some(path) = config.optional_input("calibration.csv") {
        let adjustments = io::csv::load_adjustments(&path)?;
        apply_adjustments(&mut reaches, &adjustments)?;
        log::info!("applied {} calibration adjustments", adjustments.len());
    }

    let reaches = network::index_reaches(reaches)?;
    log::info!("Building network topology...");
    let topology = NetworkTopology::build(&reaches, config.layering)?;

    let params = io::csv::load_params(&config.input("params.csv"), config.sediment, config.nutrient)?;

    let point_sources = match config.optional_input("point_sources.csv") {
        Some(path) => PointSources::new(io::csv::load_point_sources(&path)?, reaches.len())?,
        None => PointSources::default(),
    };

    Ok(Simulation::new(
        reaches,
        topology,
        params,
        point_sources,
        config.start,
        config.dt,
    )?)
}

fn load_forcing(config: &RunConfig, reach_count: usize) -> Result<Vec<StepForcing>> {
    let mut steps = io::csv::load_forcing(&config.input("loads.csv"), reach_count)?;
    if let (Some(map), Some(climate)) = (
        config.optional_input("cells.csv"),
        config.optional_input("cell_climate.csv"),
    ) {
        let cells = io::csv::load_cell_map(&map, reach_count)?;
        io::csv::apply_cell_climate(&climate, &cells, &mut steps, reach_count)?;
        log::info!("averaged climate of {} cells onto reaches", cells.cell_count());
    }
    if steps.is_empty() {
        anyhow::bail!("no timesteps in {}", config.input("loads.csv").display());
    }
    Ok(steps)
}

fn run(mut simulation: Simulation, steps: &[StepForcing], config: &RunConfig) -> Result<()> {
    let reference_time = simulation.time();
    let columns = OutputColumns::for_simulation(&simulation);
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

    let csv_path = config.output_dir.join("routing_results.csv");
    let mut csv_writer = if matches!(config.output_format, OutputFormat::Csv | OutputFormat::Both) {
        Some(io::csv::create_csv_writer(&csv_path, &columns)?)
    } else {
        None
    };
    let mut results = if matches!(config.output_format, OutputFormat::NetCdf | OutputFormat::Both) {
        Some(SimulationResults::new(columns, simulation.reach_count()))
    } else {
        None
    };

    let pb = ProgressBar::new(steps.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} steps ({eta})")?
            .progress_chars("#>-"),
    );

    log::info!("Starting layered routing...");
    for (step, forcing) in steps.iter().enumerate() {
        simulation
            .step(forcing)
            .with_context(|| format!("Routing failed at step {step}"))?;
        if let Some(wtr) = csv_writer.as_mut() {
            io::csv::write_step(wtr, &columns, &simulation, step)?;
        }
        if let Some(results) = results.as_mut() {
            results.record(&simulation, (step + 1) as f64 * config.dt);
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let basin = &simulation.flow()[0];
    if basin.clamped > 0 {
        log::warn!(
            "outflow was limited by available storage {} times across the network",
            basin.clamped
        );
    }

    if let Some(mut wtr) = csv_writer {
        wtr.flush().context("Failed to flush CSV writer")?;
        log::info!("CSV results saved to {}", csv_path.display());
    }
    if let Some(results) = results {
        write_netcdf(&results, config, &reference_time)?;
    }

    log::info!("Network routing complete after {} steps", simulation.steps_done());
    Ok(())
}

#[cfg(feature = "netcdf")]
fn write_netcdf(results: &SimulationResults, config: &RunConfig, reference_time: &chrono::NaiveDateTime) -> Result<()> {
    let nc_path = config
        .output_dir
        .join(format!("basin_route_{}.nc", reference_time.format("%Y%m%d%H%M")));
    io::netcdf::write_netcdf_output(&nc_path, results, reference_time)?;
    log::info!("NetCDF results saved to {}", nc_path.display());
    Ok(())
}

#[cfg(not(feature = "netcdf"))]
fn write_netcdf(_results: &SimulationResults, _config: &RunConfig, _reference_time: &chrono::NaiveDateTime) -> Result<()> {
    Ok(())
}
