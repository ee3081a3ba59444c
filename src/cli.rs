use anyhow::{Context, Result, bail};
use basin_route::config::{LayeringMethod, OutputFormat};
use chrono::{NaiveDate, NaiveDateTime};
use clap::Parser;
use std::path::{Path, PathBuf};

/// Route water, sediment and nutrients through a reach network
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding reaches.csv (or the SQLite database), params.csv and loads.csv
    input_dir: PathBuf,

    /// Routing timestep in seconds
    #[arg(short = 't', long, default_value_t = 86400)]
    timestep_seconds: u64,

    /// Date of the first timestep, YYYY-MM-DD
    #[arg(short, long, default_value = "2000-01-01")]
    start: NaiveDate,

    /// Worker threads, defaults to the number of CPUs
    #[arg(long)]
    threads: Option<usize>,

    /// csv, netcdf or both
    #[arg(short, long, default_value = "csv")]
    output_format: OutputFormat,

    /// topological or stream-order
    #[arg(long, default_value = "topological")]
    layering: LayeringMethod,

    /// error, warn, info, debug or trace; overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Read reach parameters from this SQLite database instead of reaches.csv
    #[arg(long)]
    sqlite: Option<PathBuf>,

    /// Where output files are written, defaults to the input directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    disable_sediment: bool,

    #[arg(long)]
    disable_nutrient: bool,
}

/// Resolved run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub dt: f64,
    pub start: NaiveDateTime,
    pub threads: usize,
    pub output_format: OutputFormat,
    pub layering: LayeringMethod,
    pub log_level: Option<String>,
    pub sqlite: Option<PathBuf>,
    pub sediment: bool,
    pub nutrient: bool,
}

impl RunConfig {
    pub fn input(&self, name: &str) -> PathBuf {
        self.input_dir.join(name)
    }

    /// Optional input file, `None` if it does not exist.
    pub fn optional_input(&self, name: &str) -> Option<PathBuf> {
        let path = self.input(name);
        path.exists().then_some(path)
    }
}

pub fn get_args() -> Result<RunConfig> {
    let args = Args::parse();

    if !args.input_dir.is_dir() {
        bail!("input directory {} does not exist", args.input_dir.display());
    }
    if args.timestep_seconds == 0 {
        bail!("timestep must be at least one second");
    }
    if let Some(db) = &args.sqlite {
        check_file(db)?;
    }

    let start = args
        .start
        .and_hms_opt(0, 0, 0)
        .context("Failed to build start time")?;

    Ok(RunConfig {
        output_dir: args.output_dir.unwrap_or_else(|| args.input_dir.clone()),
        input_dir: args.input_dir,
        dt: args.timestep_seconds as f64,
        start,
        threads: args.threads.unwrap_or_else(num_cpus::get).max(1),
        output_format: args.output_format,
        layering: args.layering,
        log_level: args.log_level,
        sqlite: args.sqlite,
        sediment: !args.disable_sediment,
        nutrient: !args.disable_nutrient,
    })
}

fn check_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!("{} is not a file", path.display());
    }
    Ok(())
}
