use crate::config::ReachParams;
use crate::forcing::{CellMap, StepForcing};
use crate::io::results::OutputColumns;
use crate::params::{Adjustment, ModelParams, ParamBuilder, ParamChange};
use crate::point_source::PointSourceRecord;
use crate::routing::Simulation;
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Writer, WriterBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b',')
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(input)
}

fn open(path: &Path) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(reader(BufReader::new(file)))
}

/// Reach parameter table, one row per reach.
pub fn load_reaches(path: &Path) -> Result<Vec<ReachParams>> {
    let mut rdr = open(path)?;
    let mut reaches = Vec::new();
    for (line, row) in rdr.deserialize::<ReachParams>().enumerate() {
        reaches.push(row.with_context(|| format!("{}: bad reach row {}", path.display(), line + 1))?);
    }
    log::info!("loaded {} reaches from {}", reaches.len(), path.display());
    Ok(reaches)
}

#[derive(Debug, Deserialize)]
struct ParamRow {
    name: String,
    value: f64,
}

/// Global parameters as `name,value` rows, validated in one pass.
pub fn load_params(path: &Path, sediment: bool, nutrient: bool) -> Result<ModelParams> {
    let mut rdr = open(path)?;
    let mut builder = ParamBuilder::new();
    for row in rdr.deserialize::<ParamRow>() {
        let row = row.with_context(|| format!("{}: bad parameter row", path.display()))?;
        builder.set(&row.name, row.value)?;
    }
    builder.with_sediment(sediment).with_nutrient(nutrient);
    let params = builder
        .finalize()
        .with_context(|| format!("Invalid parameters in {}", path.display()))?;
    Ok(params)
}

#[derive(Debug, Deserialize)]
struct AdjustmentRow {
    name: String,
    change: String,
    impact: f64,
}

/// Calibration table of `name,change,impact` rows.
pub fn load_adjustments(path: &Path) -> Result<Vec<Adjustment>> {
    let mut rdr = open(path)?;
    let mut adjustments = Vec::new();
    for row in rdr.deserialize::<AdjustmentRow>() {
        let row = row.with_context(|| format!("{}: bad calibration row", path.display()))?;
        adjustments.push(Adjustment {
            change: row.change.parse::<ParamChange>()?,
            name: row.name,
            impact: row.impact,
        });
    }
    Ok(adjustments)
}

/// Hillslope loads in long form: one row per `(step, reach_id)`.
///
/// Columns other than `step` and `reach_id` are matched to load names and
/// may be omitted. Rows for reaches outside the network are skipped.
pub fn load_forcing(path: &Path, reach_count: usize) -> Result<Vec<StepForcing>> {
    let mut rdr = open(path)?;
    let headers = rdr.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let step_col = column("step").with_context(|| format!("{}: missing `step` column", path.display()))?;
    let reach_col =
        column("reach_id").with_context(|| format!("{}: missing `reach_id` column", path.display()))?;

    let mut load_cols = Vec::new();
    for (i, h) in headers.iter().enumerate() {
        if i == step_col || i == reach_col {
            continue;
        }
        let key = h.to_ascii_lowercase();
        if crate::forcing::ReachLoads::default().field_mut(&key).is_none() {
            bail!("{}: unknown load column `{}`", path.display(), h);
        }
        load_cols.push((i, key));
    }

    let mut steps: Vec<StepForcing> = Vec::new();
    let mut skipped = 0usize;
    let mut record = StringRecord::new();
    let mut line = 1;
    while rdr.read_record(&mut record)? {
        line += 1;
        let parse = |i: usize| -> Result<f64> {
            let field = record.get(i).unwrap_or("");
            if field.is_empty() {
                return Ok(0.0);
            }
            field
                .parse::<f64>()
                .with_context(|| format!("{}:{}: bad number `{}`", path.display(), line, field))
        };
        let step = parse(step_col)? as usize;
        let reach_id = parse(reach_col)? as usize;
        if reach_id == 0 || reach_id > reach_count {
            skipped += 1;
            continue;
        }
        while steps.len() <= step {
            steps.push(StepForcing::new(reach_count));
        }
        let loads = &mut steps[step].reaches[reach_id];
        for (i, key) in &load_cols {
            if let Some(field) = loads.field_mut(key) {
                *field = parse(*i)?;
            }
        }
    }
    if skipped > 0 {
        log::warn!(
            "{}: skipped {} rows for reaches outside the network",
            path.display(),
            skipped
        );
    }
    log::info!("loaded forcing for {} timesteps", steps.len());
    Ok(steps)
}

#[derive(Debug, Deserialize)]
struct CellRow {
    cell: usize,
    reach_id: u32,
}

/// Cell to reach assignment, `cell,reach_id` with cells numbered from 0.
pub fn load_cell_map(path: &Path, reach_count: usize) -> Result<CellMap> {
    let mut rdr = open(path)?;
    let mut rows = Vec::new();
    for row in rdr.deserialize::<CellRow>() {
        rows.push(row.with_context(|| format!("{}: bad cell row", path.display()))?);
    }
    let cell_count = rows.len();
    let mut cell_reach = vec![0; cell_count];
    for row in rows {
        let slot = cell_reach
            .get_mut(row.cell)
            .with_context(|| format!("{}: cell numbers must be 0..{}", path.display(), cell_count))?;
        *slot = row.reach_id;
    }
    Ok(CellMap::new(cell_reach, reach_count)?)
}

/// Per-cell climate in long form `step,cell,<series>...`, averaged onto
/// reaches and written into `steps`. Missing steps are appended.
pub fn apply_cell_climate(path: &Path, cells: &CellMap, steps: &mut Vec<StepForcing>, reach_count: usize) -> Result<()> {
    let mut rdr = open(path)?;
    let headers = rdr.headers()?.clone();
    let step_col = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("step"))
        .with_context(|| format!("{}: missing `step` column", path.display()))?;
    let cell_col = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("cell"))
        .with_context(|| format!("{}: missing `cell` column", path.display()))?;
    let keys: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != step_col && *i != cell_col)
        .map(|(i, h)| (i, h.to_ascii_lowercase()))
        .collect();

    // step -> series -> per-cell values
    let mut grids: BTreeMap<usize, Vec<Vec<f64>>> = BTreeMap::new();
    for record in rdr.records() {
        let record = record?;
        let num = |i: usize| -> Result<f64> {
            record
                .get(i)
                .unwrap_or("")
                .parse::<f64>()
                .with_context(|| format!("{}: bad number in column {}", path.display(), i + 1))
        };
        let step = num(step_col)? as usize;
        let cell = num(cell_col)? as usize;
        if cell >= cells.cell_count() {
            bail!("{}: cell {} not in the cell map", path.display(), cell);
        }
        let grid = grids
            .entry(step)
            .or_insert_with(|| vec![vec![0.0; cells.cell_count()]; keys.len()]);
        for (k, (i, _)) in keys.iter().enumerate() {
            grid[k][cell] = num(*i)?;
        }
    }

    for (step, grid) in grids {
        while steps.len() <= step {
            steps.push(StepForcing::new(reach_count));
        }
        for ((_, key), values) in keys.iter().zip(&grid) {
            let means = cells.reach_means(key, values)?;
            steps[step].set_series(key, &means)?;
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PointSourceRow {
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
    reach_id: u32,
    size: f64,
    #[serde(default)]
    water: f64,
    #[serde(default)]
    sediment: f64,
    #[serde(default)]
    no3: f64,
    #[serde(default)]
    nh4: f64,
    #[serde(default)]
    orgn: f64,
    #[serde(default)]
    solp: f64,
    #[serde(default)]
    orgp: f64,
    #[serde(default)]
    cod: f64,
}

/// Empty or `0` means the window end is open.
fn parse_date(field: &str) -> Result<Option<NaiveDate>> {
    let field = field.trim();
    if field.is_empty() || field == "0" {
        return Ok(None);
    }
    let date = NaiveDate::parse_from_str(field, "%Y-%m-%d").with_context(|| format!("bad date `{field}`"))?;
    Ok(Some(date))
}

pub fn load_point_sources(path: &Path) -> Result<Vec<PointSourceRecord>> {
    let mut rdr = open(path)?;
    let mut records = Vec::new();
    for row in rdr.deserialize::<PointSourceRow>() {
        let row = row.with_context(|| format!("{}: bad point source row", path.display()))?;
        records.push(PointSourceRecord {
            start: parse_date(&row.start)?,
            end: parse_date(&row.end)?,
            reach_id: row.reach_id,
            size: row.size,
            water: row.water,
            sediment: row.sediment,
            no3: row.no3,
            nh4: row.nh4,
            orgn: row.orgn,
            solp: row.solp,
            orgp: row.orgp,
            cod: row.cod,
        });
    }
    Ok(records)
}

// Create CSV writer with headers
pub fn create_csv_writer(path: &Path, columns: &OutputColumns) -> Result<Writer<File>> {
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut header = vec!["step".to_string(), "time".to_string(), "reach_id".to_string()];
    header.extend(columns.variables().into_iter().map(|v| v.name));
    wtr.write_record(&header)?;
    Ok(wtr)
}

/// One row per reach plus the basin row (reach 0) for the step just run.
pub fn write_step<W: std::io::Write>(
    wtr: &mut Writer<W>,
    columns: &OutputColumns,
    sim: &Simulation,
    step: usize,
) -> Result<()> {
    let time = (sim.time() - chrono::Duration::milliseconds((sim.dt() * 1000.0) as i64))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    for id in 0..=sim.reach_count() {
        let mut record = vec![step.to_string(), time.clone(), id.to_string()];
        record.extend(columns.sample(sim, id).iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    Ok(())
}
