use crate::io::results::SimulationResults;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::path::Path;

const FILL: f32 = -9999.0;

// Function to write results to NetCDF
pub fn write_netcdf_output(
    path: &Path,
    results: &SimulationResults,
    reference_time: &NaiveDateTime,
) -> Result<()> {
    let mut file = netcdf::create(path).with_context(|| format!("Failed to create {}", path.display()))?;

    file.add_dimension("feature_id", results.feature_ids.len())?;
    file.add_dimension("time", results.times.len())?;

    let mut time_var = file.add_variable::<f64>("time", &["time"])?;
    time_var.put_attribute("_FillValue", -9999.0)?;
    time_var.put_attribute("long_name", "valid output time")?;
    time_var.put_attribute("standard_name", "time")?;
    time_var.put_attribute(
        "units",
        format!(
            "seconds since {}",
            reference_time.format("%Y-%m-%d %H:%M:%S")
        ),
    )?;
    time_var.put_attribute("missing_value", -9999.0)?;
    time_var.put_values(&results.times, ..)?;

    let mut feature_var = file.add_variable::<i64>("feature_id", &["feature_id"])?;
    feature_var.put_attribute("long_name", "Reach ID, 0 is the basin outlet aggregate")?;
    feature_var.put_values(&results.feature_ids, ..)?;

    for (variable, series) in results.variables.iter().zip(&results.data) {
        let mut var = file.add_variable::<f32>(&variable.name, &["feature_id", "time"])?;
        var.put_attribute("_FillValue", FILL)?;
        var.put_attribute("long_name", variable.long_name.as_str())?;
        var.put_attribute("units", variable.units)?;
        var.put_attribute("missing_value", FILL)?;
        for (i, values) in series.iter().enumerate() {
            var.put_values(values, (i, ..))
                .with_context(|| format!("Failed to write `{}` for feature {}", variable.name, i))?;
        }
    }

    file.add_attribute("TITLE", "OUTPUT FROM BASIN_ROUTE")?;
    file.add_attribute(
        "file_reference_time",
        reference_time.format("%Y-%m-%d_%H:%M:%S").to_string(),
    )?;
    file.add_attribute("code_version", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
