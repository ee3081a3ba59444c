use crate::forcing::ReachLoads;
use crate::params::NutrientParams;
use crate::point_source::PointSourceLoads;
use crate::qual2e::{self, Environment, ReachRates};
use crate::state::{FlowState, NutrientState, Species, SpeciesVec};

const UTIL_ZERO: f64 = 1.0e-6;
/// Depth assumed for a reach that passed water this step but ended it empty.
const MIN_DEPTH: f64 = 0.01;

/// Masses (kg) entering a reach during one step, before kinetics.
pub fn gather_inputs<'a>(
    id: usize,
    loads: &ReachLoads,
    point: Option<&PointSourceLoads>,
    channel_degradation: f64,
    params: &NutrientParams,
    upstream: impl IntoIterator<Item = &'a NutrientState>,
) -> SpeciesVec {
    let mut input = SpeciesVec::default();
    for up in upstream {
        input.add_assign(&up.outflow);
    }

    input[Species::OrgN] += loads.sed_orgn.max(0.0);
    input[Species::OrgP] += loads.sed_orgp.max(0.0);
    if let (Some(onco), Some(opco)) = (params.ch_onco, params.ch_opco) {
        input[Species::OrgN] += channel_degradation * onco * 0.001;
        input[Species::OrgP] += channel_degradation * opco * 0.001;
    }

    input[Species::No3] += (loads.sur_no3 + loads.lat_no3 + loads.gw_no3).max(0.0);
    input[Species::Nh4] += loads.sur_nh4.max(0.0);
    input[Species::SolP] += (loads.sur_solp + loads.gw_solp).max(0.0);
    input[Species::No2] += loads.no2.max(0.0);
    input[Species::Cod] += loads.sur_cod.max(0.0);

    if let Some(pt) = point {
        input[Species::No3] += pt.no3[id].max(0.0);
        input[Species::Nh4] += pt.nh4[id].max(0.0);
        input[Species::OrgN] += pt.orgn[id].max(0.0);
        input[Species::SolP] += pt.solp[id].max(0.0);
        input[Species::OrgP] += pt.orgp[id].max(0.0);
        input[Species::Cod] += pt.cod[id].max(0.0);
    }
    input
}

/// Accumulate, transform and route out one reach for one step.
pub fn route_reach(
    prev: &NutrientState,
    input: &SpeciesVec,
    flow: &FlowState,
    rates: &ReachRates,
    loads: &ReachLoads,
    params: &NutrientParams,
    dt: f64,
) -> NutrientState {
    let mut next = NutrientState {
        storage: prev.storage,
        ai0: params.ai0,
        clamped: prev.clamped,
        ..Default::default()
    };
    next.storage.add_assign(input);

    let out_volume = flow.out_volume(dt);
    let water = flow.storage + out_volume;
    if water <= 0.0 {
        next.storage = SpeciesVec::default();
        return next;
    }

    let mut conc = next.storage.scale(1000.0 / water);
    let env = Environment {
        water_temp: loads.water_temp,
        day_length: loads.day_length,
        solar_radiation: loads.solar_radiation,
        depth: flow.depth,
        tday: dt / 86400.0,
    };
    next.saturation_oxygen = qual2e::transform(&mut conc, rates, &env, params);
    next.storage = conc.scale(water * 0.001);

    route_out(&mut next, water, out_volume, flow.depth.max(MIN_DEPTH));
    next
}

fn route_out(state: &mut NutrientState, water: f64, out_volume: f64, depth: f64) {
    if water <= UTIL_ZERO || out_volume <= UTIL_ZERO || depth <= UTIL_ZERO {
        return;
    }
    let fraction = (out_volume / water).clamp(UTIL_ZERO, 1.0);
    state.outflow = state.storage.scale(fraction);
    state.outflow_conc = state.outflow.scale(1000.0 / out_volume);

    for s in Species::ALL {
        let remaining = state.storage[s] - state.outflow[s];
        state.storage[s] = if remaining < 0.0 {
            state.clamped += 1;
            0.0
        } else {
            remaining
        };
    }
}
