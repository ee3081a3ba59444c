use crate::config::ReachParams;
use crate::forcing::ReachLoads;
use crate::mc_kernel::{muskingum_weights, route_substeps};
use crate::params::FlowParams;
use crate::state::{ChannelGeometry, FlowState};

const UTIL_ZERO: f64 = 1.0e-6;
/// mm/hr to m/s
const MM_PER_HR: f64 = 2.7777777777777776e-7;

/// Water entering a reach during one step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowInflow {
    pub qs: f64,
    pub qi: f64,
    pub qg: f64,
    /// point sources, m3/s
    pub point: f64,
    pub qs_up: f64,
    pub qi_up: f64,
    pub qg_up: f64,
    /// mm
    pub pet: f64,
}

impl FlowInflow {
    /// Local loads and the routed components of the upstream reaches.
    /// Negative hillslope components are read as zero.
    pub fn gather<'a>(
        loads: &ReachLoads,
        point: f64,
        upstream: impl IntoIterator<Item = &'a FlowState>,
    ) -> Self {
        let mut inflow = FlowInflow {
            qs: loads.qs.max(0.0),
            qi: loads.qi.max(0.0),
            qg: loads.qg.max(0.0),
            point: point.max(0.0),
            pet: loads.pet.max(0.0),
            ..Default::default()
        };
        for up in upstream {
            inflow.qs_up += up.qs;
            inflow.qi_up += up.qi;
            inflow.qg_up += up.qg;
        }
        inflow
    }

    fn component_sum(&self) -> f64 {
        self.qs + self.qi + self.qg + self.qs_up + self.qi_up + self.qg_up
    }
}

/// Water balance and Muskingum routing of one reach for one step.
pub fn route_reach(
    prev: &FlowState,
    reach: &ReachParams,
    geometry: &ChannelGeometry,
    inflow: &FlowInflow,
    params: &FlowParams,
    dt: f64,
) -> FlowState {
    let st0 = prev.storage;
    let mut next = FlowState {
        bank_storage: prev.bank_storage,
        clamped: prev.clamped,
        ..Default::default()
    };
    let length = geometry.length;

    let mut q_in = inflow.component_sum() + inflow.point + params.gwrq;
    let bank_out = next.bank_storage * (1.0 - (-params.a_bnk).exp());
    next.bank_storage -= bank_out;
    q_in += bank_out / dt;

    let mut storage = st0 + q_in * dt;
    let depth = geometry.depth_for_storage(storage);
    let top_width = geometry.top_width(depth);

    // transmission loss to the deep aquifer, only where the reach is not gaining
    if inflow.qg < UTIL_ZERO {
        let seepage = reach.k_bed * MM_PER_HR * geometry.bottom_width * length * dt;
        next.seepage = take(&mut storage, seepage);
    }

    let bank_len = depth * (1.0 + geometry.side_slope * geometry.side_slope).sqrt();
    let bank_in = 2.0 * reach.k_bank * MM_PER_HR * bank_len * length * dt;
    next.bank_gain = take(&mut storage, bank_in);

    next.bank_to_gw = next.bank_storage * (1.0 - (-params.b_bnk).exp());
    next.bank_storage += next.bank_gain - next.bank_to_gw;

    let et = params.epch * inflow.pet * 0.001 * top_width * length;
    next.evaporation = take(&mut storage, et);

    if storage <= 0.0 {
        next.pre_storage = 0.0;
        next.pre_depth = 0.0;
        next.q_in = q_in;
        return next;
    }

    next.pre_storage = storage;
    next.pre_depth = geometry.depth_for_storage(storage);

    let loss = next.seepage + next.bank_gain + next.evaporation;
    let weights = muskingum_weights(length, reach.velocity, params.musk_x, params.musk_co1, dt);
    let routed = route_substeps(&weights, q_in, prev.q_in, prev.q_out, st0, loss, dt);
    if routed.limited {
        next.clamped += 1;
        log::debug!(
            "reach {}: outflow limited to available storage (shortfall {:.3e} m3)",
            reach.id,
            routed.shortfall
        );
    }

    next.q_out = routed.q_out;
    next.storage = routed.storage;

    let components = inflow.component_sum();
    if components < UTIL_ZERO {
        // only point-source, bank or deep groundwater water entered
        next.qs = next.q_out;
    } else {
        next.qs = next.q_out * (inflow.qs + inflow.qs_up) / components;
        next.qi = next.q_out * (inflow.qi + inflow.qi_up) / components;
        next.qg = next.q_out * (inflow.qg + inflow.qg_up) / components;
    }

    next.q_in = q_in;
    next.depth = geometry.depth_for_storage(next.storage);
    next.top_width = geometry.top_width(next.depth);
    next
}

/// Remove up to `amount` from `storage`, returning what was removed.
fn take(storage: &mut f64, amount: f64) -> f64 {
    let amount = amount.max(0.0);
    if *storage > amount {
        *storage -= amount;
        amount
    } else {
        let removed = *storage;
        *storage = 0.0;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mc_kernel::storage_constant;
    use crate::network::tests::reach;
    use approx::assert_relative_eq;

    fn params() -> FlowParams {
        FlowParams {
            musk_x: 0.2,
            musk_co1: 0.75,
            epch: 0.0,
            bnk0: 0.0,
            chs0_perc: 0.0,
            a_bnk: 0.0,
            b_bnk: 0.0,
            vseep0: 0.0,
            gwrq: 0.0,
        }
    }

    fn inflow(qs: f64) -> FlowInflow {
        FlowInflow {
            qs,
            ..Default::default()
        }
    }

    #[test]
    fn constant_inflow_reaches_steady_state() {
        let r = reach(1, 0, 1);
        let g = ChannelGeometry::from_reach(&r);
        let p = params();
        let mut state = FlowState::initial(&g, &p);
        for _ in 0..200 {
            state = route_reach(&state, &r, &g, &inflow(1.0), &p, 3600.0);
        }
        assert_relative_eq!(state.q_out, 1.0, epsilon = 1e-9);
        let k = storage_constant(r.length, r.velocity, p.musk_co1);
        assert_relative_eq!(state.storage, k, max_relative = 1e-6);
        assert_relative_eq!(state.qs, state.q_out);
    }

    #[test]
    fn water_balance_closes() {
        let mut r = reach(1, 0, 1);
        r.k_bed = 2.0;
        r.k_bank = 1.0;
        let g = ChannelGeometry::from_reach(&r);
        let mut p = params();
        p.chs0_perc = 0.5;
        p.epch = 0.5;
        p.bnk0 = 10.0;
        p.a_bnk = 0.1;
        p.b_bnk = 0.05;
        let dt = 86400.0;
        let mut state = FlowState::initial(&g, &p);
        for step in 0..30 {
            let i = FlowInflow {
                qs: if step % 5 == 0 { 3.0 } else { 0.2 },
                qi: 0.1,
                pet: 4.0,
                ..Default::default()
            };
            let next = route_reach(&state, &r, &g, &i, &p, dt);
            let losses = next.seepage + next.bank_gain + next.evaporation;
            let lhs = next.storage + next.q_out * dt;
            let rhs = state.storage + next.q_in * dt - losses;
            assert_relative_eq!(lhs, rhs, max_relative = 1e-9, epsilon = 1e-6);
            assert!(next.storage >= 0.0 && next.q_out >= 0.0);
            assert!(next.q_out * dt <= state.storage + next.q_in * dt + 1e-6);
            state = next;
        }
    }

    #[test]
    fn losses_can_dry_the_channel() {
        let mut r = reach(1, 0, 1);
        r.k_bed = 1.0e6;
        let g = ChannelGeometry::from_reach(&r);
        let p = params();
        let state = route_reach(&FlowState::default(), &r, &g, &inflow(0.5), &p, 3600.0);
        assert_eq!(state.q_out, 0.0);
        assert_eq!(state.storage, 0.0);
        assert_eq!(state.depth, 0.0);
        assert_relative_eq!(state.seepage, 1800.0);
    }

    #[test]
    fn gaining_reach_skips_seepage() {
        let mut r = reach(1, 0, 1);
        r.k_bed = 5.0;
        let g = ChannelGeometry::from_reach(&r);
        let i = FlowInflow {
            qg: 0.3,
            ..Default::default()
        };
        let state = route_reach(&FlowState::default(), &r, &g, &i, &params(), 3600.0);
        assert_eq!(state.seepage, 0.0);
        assert_relative_eq!(state.qg, state.q_out, epsilon = 1e-12);
    }

    #[test]
    fn point_source_only_flow_is_kept_as_surface() {
        let r = reach(1, 0, 1);
        let g = ChannelGeometry::from_reach(&r);
        let i = FlowInflow {
            point: 2.0,
            ..Default::default()
        };
        let state = route_reach(&FlowState::default(), &r, &g, &i, &params(), 3600.0);
        assert!(state.q_out > 0.0);
        assert_eq!(state.qs, state.q_out);
        assert_eq!(state.qi, 0.0);
    }

    #[test]
    fn upstream_components_are_summed() {
        let up = FlowState {
            qs: 1.0,
            qi: 0.5,
            qg: 0.25,
            ..Default::default()
        };
        let loads = ReachLoads {
            qs: -3.0,
            qi: 0.1,
            ..Default::default()
        };
        let i = FlowInflow::gather(&loads, 0.0, [&up, &up]);
        assert_eq!(i.qs, 0.0);
        assert_relative_eq!(i.qs_up, 2.0);
        assert_relative_eq!(i.qg_up, 0.5);
        assert_relative_eq!(i.component_sum(), 3.6);
    }
}
