//! Per-timestep external forcing of the reach network.
//!
//! Hillslope modules deliver water, sediment and nutrient loads into each
//! reach, and the climate layer delivers PET, water temperature, day length
//! and solar radiation. Everything here is indexed by reach id with slot 0 for
//! the basin.

use crate::error::{RouteError, RouteResult};
use serde::Deserialize;

/// Loads delivered to one reach during one timestep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReachLoads {
    /// surface runoff, m3/s
    pub qs: f64,
    /// interflow, m3/s
    pub qi: f64,
    /// groundwater flow, m3/s
    pub qg: f64,
    /// kg
    pub sediment: f64,
    // nutrient loads, kg
    pub sur_no3: f64,
    pub sur_nh4: f64,
    pub sur_solp: f64,
    pub sur_cod: f64,
    pub lat_no3: f64,
    pub gw_no3: f64,
    pub gw_solp: f64,
    pub sed_orgn: f64,
    pub sed_orgp: f64,
    pub no2: f64,
    /// potential evapotranspiration, mm
    pub pet: f64,
    /// deg C
    pub water_temp: f64,
    /// hr
    pub day_length: f64,
    /// MJ/m2
    pub solar_radiation: f64,
}

impl ReachLoads {
    pub fn field_mut(&mut self, name: &str) -> Option<&mut f64> {
        let field = match name {
            "qs" => &mut self.qs,
            "qi" => &mut self.qi,
            "qg" => &mut self.qg,
            "sediment" => &mut self.sediment,
            "sur_no3" => &mut self.sur_no3,
            "sur_nh4" => &mut self.sur_nh4,
            "sur_solp" => &mut self.sur_solp,
            "sur_cod" => &mut self.sur_cod,
            "lat_no3" => &mut self.lat_no3,
            "gw_no3" => &mut self.gw_no3,
            "gw_solp" => &mut self.gw_solp,
            "sed_orgn" => &mut self.sed_orgn,
            "sed_orgp" => &mut self.sed_orgp,
            "no2" => &mut self.no2,
            "pet" => &mut self.pet,
            "water_temp" => &mut self.water_temp,
            "day_length" => &mut self.day_length,
            "solar_radiation" => &mut self.solar_radiation,
            _ => return None,
        };
        Some(field)
    }
}

/// Forcing for the whole network at one timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct StepForcing {
    pub reaches: Vec<ReachLoads>,
}

impl StepForcing {
    pub fn new(reach_count: usize) -> Self {
        StepForcing {
            reaches: vec![ReachLoads::default(); reach_count + 1],
        }
    }

    pub fn reach_count(&self) -> usize {
        self.reaches.len().saturating_sub(1)
    }

    pub fn get(&self, id: u32) -> &ReachLoads {
        &self.reaches[id as usize]
    }

    /// Set one named series for every reach. `values` includes slot 0.
    pub fn set_series(&mut self, key: &str, values: &[f64]) -> RouteResult<()> {
        if values.len() != self.reaches.len() {
            return Err(RouteError::InputSizeMismatch {
                key: key.to_string(),
                expected: self.reaches.len(),
                actual: values.len(),
            });
        }
        for (loads, &v) in self.reaches.iter_mut().zip(values) {
            let field = loads
                .field_mut(key)
                .ok_or_else(|| RouteError::UnknownParameter(key.to_string()))?;
            *field = v;
        }
        Ok(())
    }

    pub fn check_size(&self, expected_reaches: usize) -> RouteResult<()> {
        if self.reaches.len() != expected_reaches + 1 {
            return Err(RouteError::InputSizeMismatch {
                key: "reach forcing".to_string(),
                expected: expected_reaches + 1,
                actual: self.reaches.len(),
            });
        }
        Ok(())
    }
}

/// Maps raster cells onto reaches for climate inputs supplied per cell.
#[derive(Debug, Clone)]
pub struct CellMap {
    cell_reach: Vec<u32>,
    cells_per_reach: Vec<usize>,
}

impl CellMap {
    pub fn new(cell_reach: Vec<u32>, reach_count: usize) -> RouteResult<Self> {
        let mut cells_per_reach = vec![0; reach_count + 1];
        for &id in &cell_reach {
            if id as usize > reach_count {
                return Err(RouteError::Configuration(format!(
                    "cell assigned to reach {id}, network has {reach_count} reaches"
                )));
            }
            cells_per_reach[id as usize] += 1;
        }
        Ok(CellMap {
            cell_reach,
            cells_per_reach,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.cell_reach.len()
    }

    /// Mean of `values` over the cells of each reach. Slot 0 holds the mean
    /// across reaches that own at least one cell. Cells mapped to id 0 are
    /// outside the network and ignored.
    pub fn reach_means(&self, key: &str, values: &[f64]) -> RouteResult<Vec<f64>> {
        if values.len() != self.cell_reach.len() {
            return Err(RouteError::InputSizeMismatch {
                key: key.to_string(),
                expected: self.cell_reach.len(),
                actual: values.len(),
            });
        }
        let mut sums = vec![0.0; self.cells_per_reach.len()];
        for (&id, &v) in self.cell_reach.iter().zip(values) {
            if id != 0 {
                sums[id as usize] += v;
            }
        }
        let mut covered = 0;
        let mut basin = 0.0;
        for (id, sum) in sums.iter_mut().enumerate().skip(1) {
            let cells = self.cells_per_reach[id];
            if cells > 0 {
                *sum /= cells as f64;
                basin += *sum;
                covered += 1;
            }
        }
        sums[0] = if covered > 0 { basin / covered as f64 } else { 0.0 };
        Ok(sums)
    }
}
