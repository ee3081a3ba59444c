use crate::config::ReachParams;
use crate::error::{RouteError, RouteResult};
use crate::flow::{self, FlowInflow};
use crate::forcing::StepForcing;
use crate::network::NetworkTopology;
use crate::nutrient;
use crate::params::ModelParams;
use crate::point_source::{PointSourceLoads, PointSources};
use crate::qual2e::ReachRates;
use crate::sediment::{self, BedProperties, SedimentInflow};
use crate::state::{FlowState, NutrientState, ReachStates, SedimentState, SpeciesVec};
use chrono::{Duration, NaiveDateTime};
use rayon::prelude::*;

/// Route every layer in order, reaches inside a layer in parallel.
///
/// `route` sees the whole state slice as it stood at the start of the
/// layer: upstream reaches already hold this step's values, the reach
/// itself still holds last step's. Results are written back once the whole
/// layer is done.
pub fn route_layers<T, F>(topology: &NetworkTopology, states: &mut [T], route: F)
where
    T: Send + Sync,
    F: Fn(u32, &[T]) -> T + Sync,
{
    for layer in &topology.layers {
        let updated: Vec<(u32, T)> = {
            let snapshot: &[T] = states;
            layer
                .par_iter()
                .map(|&id| (id, route(id, snapshot)))
                .collect()
        };
        for (id, state) in updated {
            states[id as usize] = state;
        }
    }
}

/// Owns the network, parameters and all per-reach state of one run.
pub struct Simulation {
    /// `reaches[id]` describes reach `id`; slot 0 is a placeholder
    reaches: Vec<ReachParams>,
    rates: Vec<ReachRates>,
    topology: NetworkTopology,
    params: ModelParams,
    point_sources: PointSources,
    pub states: ReachStates,
    pub point_loads: PointSourceLoads,
    dt: f64,
    time: NaiveDateTime,
    step: usize,
}

impl Simulation {
    /// `reaches` must be sorted so `reaches[id - 1]` is reach `id`.
    pub fn new(
        reaches: Vec<ReachParams>,
        topology: NetworkTopology,
        params: ModelParams,
        point_sources: PointSources,
        start: NaiveDateTime,
        dt: f64,
    ) -> RouteResult<Self> {
        if reaches.len() != topology.reach_count {
            return Err(RouteError::InputSizeMismatch {
                key: "reaches".to_string(),
                expected: topology.reach_count,
                actual: reaches.len(),
            });
        }
        if !(dt > 0.0) {
            return Err(RouteError::InvalidParameter {
                name: "dt".to_string(),
                value: dt,
                reason: "must be positive",
            });
        }

        let states = ReachStates::initial(&reaches, &params);
        let mut table = vec![ReachParams::default()];
        table.extend(reaches);
        let rates = table.iter().map(ReachRates::from).collect();

        log::info!(
            "simulation initialized: {} reaches, dt {} s, sediment {}, nutrient {}",
            topology.reach_count,
            dt,
            params.sediment.is_some(),
            params.nutrient.is_some()
        );

        Ok(Simulation {
            point_loads: PointSourceLoads::zeros(topology.reach_count),
            reaches: table,
            rates,
            topology,
            params,
            point_sources,
            states,
            dt,
            time: start,
            step: 0,
        })
    }

    pub fn topology(&self) -> &NetworkTopology {
        &self.topology
    }

    pub fn reach_count(&self) -> usize {
        self.topology.reach_count
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Start of the step that will run next.
    pub fn time(&self) -> NaiveDateTime {
        self.time
    }

    pub fn steps_done(&self) -> usize {
        self.step
    }

    pub fn flow(&self) -> &[FlowState] {
        &self.states.flow
    }

    pub fn sediment(&self) -> Option<&[SedimentState]> {
        self.states.sediment.as_deref()
    }

    pub fn nutrient(&self) -> Option<&[NutrientState]> {
        self.states.nutrient.as_deref()
    }

    /// Advance all engines by one timestep.
    pub fn step(&mut self, forcing: &StepForcing) -> RouteResult<()> {
        forcing.check_size(self.reach_count())?;

        if !self.point_sources.is_empty() {
            self.point_loads = self.point_sources.evaluate(self.time.date(), self.dt);
        }
        self.route_flow(forcing);
        if self.params.sediment.is_some() {
            self.route_sediment(forcing);
        }
        if self.params.nutrient.is_some() {
            self.route_nutrient(forcing);
        }
        self.reduce_basin();

        log::debug!(
            "step {} ({}): outlet discharge {:.4} m3/s",
            self.step,
            self.time,
            self.states.flow[0].q_out
        );
        self.step += 1;
        self.time += Duration::milliseconds((self.dt * 1000.0) as i64);
        Ok(())
    }

    fn route_flow(&mut self, forcing: &StepForcing) {
        let Simulation {
            reaches,
            topology,
            params,
            states,
            point_loads,
            dt,
            ..
        } = self;
        let geometry = &states.geometry;
        let upstream = &topology.upstream;

        route_layers(topology, &mut states.flow, |id, flow| {
            let i = id as usize;
            let inflow = FlowInflow::gather(
                forcing.get(id),
                point_loads.water[i],
                upstream[i].iter().map(|&u| &flow[u as usize]),
            );
            flow::route_reach(&flow[i], &reaches[i], &geometry[i], &inflow, &params.flow, *dt)
        });
    }

    fn route_sediment(&mut self, forcing: &StepForcing) {
        let Simulation {
            reaches,
            topology,
            params,
            states,
            point_loads,
            dt,
            ..
        } = self;
        let (Some(sed_params), Some(sediment)) = (&params.sediment, states.sediment.as_mut()) else {
            return;
        };
        let flow = &states.flow;
        let upstream = &topology.upstream;

        route_layers(topology, sediment, |id, sed| {
            let i = id as usize;
            let inflow = SedimentInflow::gather(
                forcing.get(id).sediment,
                point_loads.sediment[i],
                upstream[i].iter().map(|&u| &sed[u as usize]),
            );
            let bed = BedProperties {
                length: states.geometry[i].length,
                erod: reaches[i].erod,
                cover: reaches[i].cover,
            };
            sediment::route_reach(&sed[i], &flow[i], &bed, &inflow, sed_params, *dt)
        });

        if sed_params.vcd {
            for id in 1..=topology.reach_count {
                if let Some(cut) = sediment::downcut(&mut states.geometry[id], &flow[id], reaches[id].erod) {
                    log::debug!("reach {id}: channel downcut by {cut:.4} m");
                }
            }
        }
    }

    fn route_nutrient(&mut self, forcing: &StepForcing) {
        let Simulation {
            rates,
            topology,
            params,
            states,
            point_loads,
            dt,
            ..
        } = self;
        let (Some(nut_params), Some(nutrient)) = (&params.nutrient, states.nutrient.as_mut()) else {
            return;
        };
        let flow = &states.flow;
        let degradation = states.sediment.as_deref();
        let upstream = &topology.upstream;

        route_layers(topology, nutrient, |id, nut| {
            let i = id as usize;
            let loads = forcing.get(id);
            let deg2 = degradation.map_or(0.0, |s| s[i].degradation);
            let input = nutrient::gather_inputs(
                i,
                loads,
                Some(&*point_loads),
                deg2,
                nut_params,
                upstream[i].iter().map(|&u| &nut[u as usize]),
            );
            nutrient::route_reach(&nut[i], &input, &flow[i], &rates[i], loads, nut_params, *dt)
        });
    }

    /// Fill slot 0: outflows summed over outlet reaches, storages over all reaches.
    fn reduce_basin(&mut self) {
        let outlets = &self.topology.outlets;
        let all = 1..=self.topology.reach_count;

        let flow = &self.states.flow;
        let mut basin = FlowState {
            clamped: flow[1..].iter().map(|f| f.clamped).sum(),
            ..Default::default()
        };
        for &o in outlets {
            let f = &flow[o as usize];
            basin.q_out += f.q_out;
            basin.qs += f.qs;
            basin.qi += f.qi;
            basin.qg += f.qg;
        }
        for i in all.clone() {
            let f = &flow[i];
            basin.q_in += f.q_in;
            basin.storage += f.storage;
            basin.pre_storage += f.pre_storage;
            basin.bank_storage += f.bank_storage;
            basin.seepage += f.seepage;
            basin.bank_gain += f.bank_gain;
            basin.bank_to_gw += f.bank_to_gw;
            basin.evaporation += f.evaporation;
        }
        self.states.flow[0] = basin;

        if let Some(sed) = self.states.sediment.as_mut() {
            let mut basin = SedimentState::default();
            for &o in outlets {
                basin.outflow += sed[o as usize].outflow;
            }
            let out_volume = self.states.flow[0].out_volume(self.dt);
            basin.concentration = if out_volume > 0.0 {
                basin.outflow / out_volume
            } else {
                0.0
            };
            for i in all.clone() {
                let s = &sed[i];
                basin.storage += s.storage;
                basin.bed_deposit += s.bed_deposit;
                basin.cumulative_degradation += s.cumulative_degradation;
                basin.deposition += s.deposition;
                basin.degradation += s.degradation;
                basin.clamped += s.clamped;
            }
            sed[0] = basin;
        }

        if let Some(nut) = self.states.nutrient.as_mut() {
            let mut basin = NutrientState {
                ai0: nut[0].ai0,
                ..Default::default()
            };
            let mut outflow = SpeciesVec::default();
            for &o in outlets {
                outflow.add_assign(&nut[o as usize].outflow);
            }
            let out_volume = self.states.flow[0].out_volume(self.dt);
            if out_volume > 0.0 {
                basin.outflow_conc = outflow.scale(1000.0 / out_volume);
            }
            basin.outflow = outflow;
            for i in all {
                basin.storage.add_assign(&nut[i].storage);
                basin.clamped += nut[i].clamped;
            }
            nut[0] = basin;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayeringMethod;
    use crate::network::tests::reach;
    use crate::params::tests::flow_only;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2012, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn layers_see_upstream_results_of_the_same_pass() {
        // 1 -> 2 -> 3
        let reaches = vec![reach(1, 2, 1), reach(2, 3, 2), reach(3, 0, 3)];
        let topo = NetworkTopology::build(&reaches, LayeringMethod::Topological).unwrap();
        let mut values = vec![0u32; 4];
        route_layers(&topo, &mut values, |id, v| {
            let up: u32 = topo.upstream[id as usize].iter().map(|&u| v[u as usize]).sum();
            up + 1
        });
        assert_eq!(values, vec![0, 1, 2, 3]);
    }

    #[test]
    fn basin_slot_sums_outlets() {
        let reaches = vec![reach(1, 0, 1), reach(2, 0, 1)];
        let topo = NetworkTopology::build(&reaches, LayeringMethod::Topological).unwrap();
        let params = flow_only().finalize().unwrap();
        let mut sim = Simulation::new(reaches, topo, params, PointSources::default(), start(), 3600.0).unwrap();
        let mut forcing = StepForcing::new(2);
        forcing.reaches[1].qs = 1.0;
        forcing.reaches[2].qs = 2.0;
        for _ in 0..50 {
            sim.step(&forcing).unwrap();
        }
        let flow = sim.flow();
        approx::assert_relative_eq!(flow[0].q_out, flow[1].q_out + flow[2].q_out);
        approx::assert_relative_eq!(flow[0].q_out, 3.0, epsilon = 1e-6);
        approx::assert_relative_eq!(flow[0].storage, flow[1].storage + flow[2].storage);
        assert_eq!(sim.steps_done(), 50);
        assert_eq!(sim.time(), start() + Duration::hours(50));
    }

    #[test]
    fn forcing_size_is_checked() {
        let reaches = vec![reach(1, 0, 1)];
        let topo = NetworkTopology::build(&reaches, LayeringMethod::Topological).unwrap();
        let params = flow_only().finalize().unwrap();
        let mut sim = Simulation::new(reaches, topo, params, PointSources::default(), start(), 3600.0).unwrap();
        assert!(matches!(
            sim.step(&StepForcing::new(3)),
            Err(RouteError::InputSizeMismatch { .. })
        ));
    }
}
