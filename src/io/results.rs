use crate::routing::Simulation;
use crate::state::Species;

/// One output series, reported for every reach and the basin slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub long_name: String,
    pub units: &'static str,
}

impl Variable {
    fn new(name: impl Into<String>, long_name: impl Into<String>, units: &'static str) -> Self {
        Variable {
            name: name.into(),
            long_name: long_name.into(),
            units,
        }
    }
}

/// Which output series a run produces, depending on the enabled engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputColumns {
    pub sediment: bool,
    pub nutrient: bool,
}

impl OutputColumns {
    pub fn for_simulation(sim: &Simulation) -> Self {
        OutputColumns {
            sediment: sim.sediment().is_some(),
            nutrient: sim.nutrient().is_some(),
        }
    }

    pub fn variables(&self) -> Vec<Variable> {
        let mut vars = vec![
            Variable::new("q_out", "Discharge", "m3 s-1"),
            Variable::new("qs", "Surface runoff component of discharge", "m3 s-1"),
            Variable::new("qi", "Interflow component of discharge", "m3 s-1"),
            Variable::new("qg", "Groundwater component of discharge", "m3 s-1"),
            Variable::new("storage", "Channel storage", "m3"),
            Variable::new("depth", "Water depth", "m"),
            Variable::new("width", "Water surface width", "m"),
            Variable::new("bank_storage", "Bank storage", "m3"),
            Variable::new("seepage", "Transmission loss", "m3"),
        ];
        if self.sediment {
            vars.extend([
                Variable::new("sed_out", "Sediment outflow", "kg"),
                Variable::new("sed_conc", "Sediment concentration of outflow", "kg m-3"),
                Variable::new("sed_storage", "Suspended sediment in channel", "kg"),
                Variable::new("deposition", "Sediment deposition", "kg"),
            ]);
        }
        if self.nutrient {
            for s in Species::ALL {
                vars.push(Variable::new(format!("{}_out", s.name()), format!("{} outflow", s.name()), "kg"));
                vars.push(Variable::new(
                    format!("{}_conc", s.name()),
                    format!("{} concentration of outflow", s.name()),
                    "mg L-1",
                ));
            }
            vars.extend([
                Variable::new("chla_out", "chlorophyll-a outflow", "kg"),
                Variable::new("chla_conc", "chlorophyll-a concentration of outflow", "mg L-1"),
                Variable::new("tn_out", "total nitrogen outflow", "kg"),
                Variable::new("tp_out", "total phosphorus outflow", "kg"),
                Variable::new("tn_storage", "total nitrogen in channel", "kg"),
                Variable::new("tp_storage", "total phosphorus in channel", "kg"),
                Variable::new("tn_conc", "total nitrogen concentration of outflow", "mg L-1"),
                Variable::new("tp_conc", "total phosphorus concentration of outflow", "mg L-1"),
            ]);
        }
        vars
    }

    /// Current values of reach `id` (0 = basin) in the order of [`Self::variables`].
    pub fn sample(&self, sim: &Simulation, id: usize) -> Vec<f64> {
        let f = &sim.flow()[id];
        let mut values = vec![
            f.q_out,
            f.qs,
            f.qi,
            f.qg,
            f.storage,
            f.depth,
            f.top_width,
            f.bank_storage,
            f.seepage,
        ];
        if self.sediment {
            match sim.sediment() {
                Some(sed) => {
                    let s = &sed[id];
                    values.extend([s.outflow, s.concentration, s.storage, s.deposition]);
                }
                None => values.extend([0.0; 4]),
            }
        }
        if self.nutrient {
            match sim.nutrient() {
                Some(nut) => {
                    let n = &nut[id];
                    for s in Species::ALL {
                        values.push(n.outflow[s]);
                        values.push(n.outflow_conc[s]);
                    }
                    values.extend([
                        n.chlora_outflow(),
                        n.outflow_conc[Species::Algae] * n.ai0,
                        n.outflow.total_n(),
                        n.outflow.total_p(),
                        n.storage.total_n(),
                        n.storage.total_p(),
                        n.outflow_conc.total_n(),
                        n.outflow_conc.total_p(),
                    ]);
                }
                None => values.extend(std::iter::repeat_n(0.0, Species::ALL.len() * 2 + 8)),
            }
        }
        values
    }
}

// Structure to store results for NetCDF output
#[derive(Debug)]
pub struct SimulationResults {
    pub feature_ids: Vec<i64>,
    /// seconds since the reference time, one entry per recorded step
    pub times: Vec<f64>,
    pub variables: Vec<Variable>,
    /// `data[variable][feature]` is the time series of one reach
    pub data: Vec<Vec<Vec<f32>>>,
    columns: OutputColumns,
}

impl SimulationResults {
    pub fn new(columns: OutputColumns, reach_count: usize) -> Self {
        let variables = columns.variables();
        SimulationResults {
            feature_ids: (0..=reach_count as i64).collect(),
            times: Vec::new(),
            data: vec![vec![Vec::new(); reach_count + 1]; variables.len()],
            variables,
            columns,
        }
    }

    /// Append the state at the end of the step that just ran.
    pub fn record(&mut self, sim: &Simulation, elapsed_seconds: f64) {
        self.times.push(elapsed_seconds);
        for id in 0..self.feature_ids.len() {
            for (v, value) in self.columns.sample(sim, id).into_iter().enumerate() {
                self.data[v][id].push(value as f32);
            }
        }
    }
}
