//! Simplified Bagnold stream-power sediment routing.
//!
//! Transport capacity `spcon * v_peak^spexp` decides whether the reach
//! deposits or entrains. Entrainment first takes back previously deposited
//! material and then erodes the channel bed itself.

use crate::params::SedimentParams;
use crate::state::{ChannelGeometry, FlowState, SedimentState};

const UTIL_ZERO: f64 = 1.0e-6;
const MAX_PEAK_VELOCITY: f64 = 5.0;
/// Mg/m3 of sediment a unit of outflow can carry at most
const MAX_OUTFLOW_CONC: f64 = 0.848;

/// Sediment entering a reach during one step, kg.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SedimentInflow {
    pub upstream: f64,
    pub hillslope: f64,
    pub point: f64,
}

impl SedimentInflow {
    pub fn gather<'a>(
        hillslope: f64,
        point: f64,
        upstream: impl IntoIterator<Item = &'a SedimentState>,
    ) -> Self {
        SedimentInflow {
            upstream: upstream.into_iter().map(|s| s.outflow).sum(),
            hillslope: hillslope.max(0.0),
            point: point.max(0.0),
        }
    }

    pub fn total(&self) -> f64 {
        self.upstream + self.hillslope + self.point
    }
}

/// Channel bed erodibility and cover of one reach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BedProperties {
    pub length: f64,
    pub erod: f64,
    pub cover: f64,
}

pub fn route_reach(
    prev: &SedimentState,
    flow: &FlowState,
    bed: &BedProperties,
    inflow: &SedimentInflow,
    params: &SedimentParams,
    dt: f64,
) -> SedimentState {
    let mut all_sediment = prev.storage + inflow.total();
    let out_volume = flow.out_volume(dt);
    let water = flow.pre_storage;

    let mut next = SedimentState {
        bed_deposit: prev.bed_deposit,
        cumulative_degradation: prev.cumulative_degradation,
        clamped: prev.clamped,
        ..Default::default()
    };

    if (flow.q_out < UTIL_ZERO && flow.pre_depth < UTIL_ZERO) || water < 0.01 {
        next.storage = all_sediment;
        return next;
    }

    let peak_q = flow.q_out * params.p_rf;
    let area = water / bed.length;
    let peak_v = if flow.pre_depth < 0.01 {
        0.01
    } else {
        (peak_q / area).clamp(UTIL_ZERO, MAX_PEAK_VELOCITY)
    };
    let tbase = (bed.length / (dt * peak_v)).min(1.0);

    let init_conc = all_sediment / water;
    let max_conc = params.spcon * peak_v.powf(params.spexp) * 1000.0;
    let mut deposition = water * (init_conc - max_conc);
    if peak_v < params.vcrit {
        deposition = 0.0;
    }

    let (deg1, deg2) = if deposition < 0.0 {
        let deg = -deposition * tbase;
        deposition = 0.0;
        if deg >= next.bed_deposit {
            let deg1 = next.bed_deposit;
            (deg1, (deg - deg1) * bed.erod * bed.cover)
        } else {
            (deg, 0.0)
        }
    } else {
        (0.0, 0.0)
    };

    next.bed_deposit += deposition - deg1;
    if next.bed_deposit < UTIL_ZERO {
        next.bed_deposit = 0.0;
    }
    next.cumulative_degradation += deg1 + deg2;

    all_sediment += deg1 + deg2 - deposition;
    if all_sediment < 0.0 {
        next.clamped += 1;
        all_sediment = 0.0;
    }

    let fraction = (out_volume / water).min(1.0);
    let mut outflow = all_sediment * fraction;
    if outflow < UTIL_ZERO {
        outflow = 0.0;
    }
    next.storage = (all_sediment - outflow).max(0.0);

    let capacity = MAX_OUTFLOW_CONC * out_volume * 1000.0;
    if outflow > capacity {
        next.bed_deposit += outflow - capacity;
        outflow = capacity;
    }

    next.outflow = outflow;
    next.concentration = if out_volume > 0.0 {
        outflow / out_volume
    } else {
        0.0
    };
    next.deposition = deposition;
    next.degradation = deg2;
    next
}

/// Deepen a reach that ran a large volume without aggrading its bed.
///
/// Returns the cut depth in m if the channel was modified.
pub fn downcut(geometry: &mut ChannelGeometry, flow: &FlowState, erod: f64) -> Option<f64> {
    let depth_change = flow.pre_depth - flow.depth;
    if depth_change >= geometry.slope * geometry.length || flow.pre_storage <= 1.4e6 {
        return None;
    }
    let cut = 358.6 * flow.depth * geometry.slope * erod;
    if cut <= 0.0 {
        return None;
    }
    geometry.downcut(cut);
    Some(cut)
}
