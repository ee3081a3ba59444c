use approx::assert_relative_eq;
use basin_route::config::{LayeringMethod, ReachParams};
use basin_route::forcing::StepForcing;
use basin_route::mc_kernel::storage_constant;
use basin_route::network::NetworkTopology;
use basin_route::params::{ModelParams, ParamBuilder};
use basin_route::point_source::{PointSourceRecord, PointSources};
use basin_route::qual2e::saturation_oxygen;
use basin_route::routing::Simulation;
use basin_route::state::{FlowState, NutrientState, SedimentState, Species};
use chrono::{NaiveDate, NaiveDateTime};

const FLOW: &[(&str, f64)] = &[
    ("musk_x", 0.2),
    ("musk_co1", 0.75),
    ("epch", 0.0),
    ("bnk0", 0.0),
    ("chs0_perc", 0.0),
    ("a_bnk", 0.0),
    ("b_bnk", 0.0),
];

const SEDIMENT: &[(&str, f64)] = &[
    ("p_rf", 1.0),
    ("spcon", 0.0001),
    ("spexp", 1.0),
    ("vcrit", 0.0),
    ("sed_chi0", 0.0),
];

const NUTRIENT: &[(&str, f64)] = &[
    ("ai0", 50.0),
    ("ai1", 0.08),
    ("ai2", 0.015),
    ("ai3", 1.6),
    ("ai4", 2.0),
    ("ai5", 3.5),
    ("ai6", 1.07),
    ("lambda0", 1.0),
    ("lambda1", 0.03),
    ("lambda2", 0.054),
    ("k_l", 0.75),
    ("k_n", 0.02),
    ("k_p", 0.025),
    ("p_n", 0.5),
    ("tfact", 0.3),
    ("mumax", 2.0),
    ("rhoq", 2.5),
    ("igropt", 2.0),
    ("cod_n", 1.0),
    ("cod_k", 1.0),
];

fn params(overrides: &[(&str, f64)], sediment: bool, nutrient: bool) -> ModelParams {
    let mut b = ParamBuilder::new();
    for (k, v) in FLOW.iter().chain(SEDIMENT).chain(NUTRIENT).chain(overrides) {
        b.set(k, *v).unwrap();
    }
    b.with_sediment(sediment).with_nutrient(nutrient);
    b.finalize().unwrap()
}

fn reach(id: u32, downstream: u32, order: u32) -> ReachParams {
    ReachParams {
        id,
        downstream,
        order,
        length: 1000.0,
        width: 10.0,
        depth: 1.0,
        side_slope: 2.0,
        velocity: 1.0,
        slope: 0.001,
        cover: 0.5,
        erod: 0.2,
        ..Default::default()
    }
}

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2005, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn simulation(reaches: Vec<ReachParams>, params: ModelParams, dt: f64) -> Simulation {
    let topology = NetworkTopology::build(&reaches, LayeringMethod::Topological).unwrap();
    Simulation::new(reaches, topology, params, PointSources::default(), start(), dt).unwrap()
}

#[test]
fn headwater_reach_reaches_steady_state() {
    let p = params(&[], false, false);
    let mut sim = simulation(vec![reach(1, 0, 1)], p, 3600.0);
    let mut forcing = StepForcing::new(1);
    forcing.reaches[1].qs = 1.0;
    for _ in 0..300 {
        sim.step(&forcing).unwrap();
    }
    let f = &sim.flow()[1];
    assert_relative_eq!(f.q_out, 1.0, epsilon = 1e-9);
    assert_relative_eq!(f.storage, storage_constant(1000.0, 1.0, 0.75), max_relative = 1e-6);
    assert_relative_eq!(sim.flow()[0].q_out, f.q_out);
}

#[test]
fn downstream_reach_sees_upstream_outflow_of_the_same_step() {
    let p = params(&[], false, false);
    let reaches = vec![reach(1, 3, 1), reach(2, 3, 1), reach(3, 0, 2)];
    let mut sim = simulation(reaches, p, 3600.0);
    assert_eq!(sim.topology().layers, vec![vec![1, 2], vec![3]]);

    let mut forcing = StepForcing::new(3);
    forcing.reaches[1].qs = 2.0;
    forcing.reaches[2].qi = 1.0;
    sim.step(&forcing).unwrap();

    let flow = sim.flow();
    assert!(flow[1].q_out > 0.0 && flow[2].q_out > 0.0);
    assert_relative_eq!(flow[3].q_in, flow[1].q_out + flow[2].q_out, max_relative = 1e-12);
    assert_relative_eq!(
        flow[3].qs + flow[3].qi,
        flow[3].q_out,
        max_relative = 1e-12
    );
}

#[test]
fn supersaturated_reach_deposits() {
    let p = params(&[("chs0_perc", 0.5), ("sed_chi0", 1.0)], true, false);
    let mut sim = simulation(vec![reach(1, 0, 1)], p, 3600.0);
    let mut forcing = StepForcing::new(1);
    forcing.reaches[1].qs = 1.0;
    sim.step(&forcing).unwrap();

    let sed = &sim.sediment().unwrap()[1];
    assert!(sed.deposition > 0.0);
    assert_eq!(sed.degradation, 0.0);
    assert_eq!(sed.cumulative_degradation, 0.0);
    assert!(sed.bed_deposit > 0.0);
}

#[test]
fn nutrient_reach_without_water_is_emptied() {
    let p = params(&[], true, true);
    let mut r = reach(1, 0, 1);
    r.no3 = 2.0;
    r.disox = 8.0;
    let mut sim = simulation(vec![r], p, 86400.0);
    let mut forcing = StepForcing::new(1);
    forcing.reaches[1].sur_no3 = 5.0;
    forcing.reaches[1].sed_orgp = 1.0;
    forcing.reaches[1].water_temp = 15.0;
    sim.step(&forcing).unwrap();

    assert_eq!(sim.flow()[1].storage, 0.0);
    let n = &sim.nutrient().unwrap()[1];
    for s in Species::ALL {
        for v in [n.storage[s], n.outflow[s], n.outflow_conc[s]] {
            assert!(v.is_finite());
            assert_eq!(v, 0.0, "{} not emptied", s.name());
        }
    }
}

#[test]
fn oxygen_saturation_at_twenty_degrees() {
    assert_relative_eq!(saturation_oxygen(20.0), 9.09, epsilon = 0.02);
}

#[test]
fn point_source_evaluation_has_no_hidden_state() {
    let record = PointSourceRecord {
        reach_id: 2,
        size: 3.0,
        water: 100.0,
        no3: 4.0,
        ..Default::default()
    };
    let sources = PointSources::new(vec![record], 2).unwrap();
    let day = NaiveDate::from_ymd_opt(2005, 3, 2).unwrap();
    assert_eq!(sources.evaluate(day, 3600.0), sources.evaluate(day, 3600.0));
}

/// 1,2 -> 3; 4 -> 5; 3,5 -> 6 with every engine on and a varied load series.
#[test]
fn network_run_conserves_water_and_stays_non_negative() {
    let mut reaches = vec![
        reach(1, 3, 1),
        reach(2, 3, 1),
        reach(3, 6, 2),
        reach(4, 5, 1),
        reach(5, 6, 2),
        reach(6, 0, 3),
    ];
    for r in reaches.iter_mut() {
        r.k_bed = 0.5;
        r.k_bank = 0.2;
        r.no3 = 1.0;
        r.nh4 = 0.1;
        r.solp = 0.05;
        r.algae = 0.5;
        r.disox = 8.0;
        r.bod = 2.0;
        r.bc1 = 0.5;
        r.bc2 = 1.0;
        r.bc3 = 0.2;
        r.bc4 = 0.3;
        r.rk1 = 0.5;
        r.rk2 = 2.0;
        r.rs1 = 1.0;
    }
    let p = params(
        &[
            ("chs0_perc", 0.3),
            ("epch", 0.8),
            ("bnk0", 5.0),
            ("a_bnk", 0.1),
            ("b_bnk", 0.02),
            ("sed_chi0", 0.001),
        ],
        true,
        true,
    );
    let dt = 86400.0;
    let mut sim = simulation(reaches, p, dt);

    for step in 0..40 {
        let mut forcing = StepForcing::new(6);
        for id in [1, 2, 4] {
            let l = &mut forcing.reaches[id];
            l.qs = if step % 7 == 0 { 4.0 } else { 0.05 * id as f64 };
            l.qg = if step > 20 { 0.0 } else { 0.1 };
            l.sediment = if step % 7 == 0 { 5.0e4 } else { 0.0 };
            l.sur_no3 = 3.0;
            l.sur_solp = 0.4;
        }
        for l in forcing.reaches.iter_mut() {
            l.pet = 3.0;
            l.water_temp = 12.0;
            l.day_length = 11.0;
            l.solar_radiation = 14.0;
        }

        let before: Vec<FlowState> = sim.flow().to_vec();
        sim.step(&forcing).unwrap();

        let flow = sim.flow();
        for id in 1..=6 {
            let (b, a) = (&before[id], &flow[id]);
            let losses = a.seepage + a.bank_gain + a.evaporation;
            assert_relative_eq!(
                a.storage + a.q_out * dt,
                b.storage + a.q_in * dt - losses,
                max_relative = 1e-9,
                epsilon = 1e-6
            );
            assert!(a.q_out * dt <= b.storage + a.q_in * dt + 1e-6);
            assert!(a.storage >= 0.0 && a.q_out >= 0.0 && a.depth >= 0.0);
        }

        for s in sim.sediment().unwrap() {
            assert!(s.storage >= 0.0 && s.outflow >= 0.0 && s.concentration >= 0.0);
            assert!(s.bed_deposit >= 0.0);
        }
        for n in sim.nutrient().unwrap() {
            for (_, v) in n.storage.iter().chain(n.outflow.iter()).chain(n.outflow_conc.iter()) {
                assert!(v.is_finite() && v >= 0.0);
            }
        }

        let basin = &flow[0];
        assert_relative_eq!(basin.q_out, flow[6].q_out);
        let total: f64 = flow[1..].iter().map(|f| f.storage).sum();
        assert_relative_eq!(basin.storage, total, max_relative = 1e-12);
    }
    assert_eq!(sim.steps_done(), 40);
}

/// Reach 1 loses a third of its inflow to the bed and ends every loaded
/// step empty; what it held must still leave with the outflow.
#[test]
fn draining_reach_passes_on_its_loads() {
    let mut r1 = reach(1, 2, 1);
    r1.k_bed = 400.0;
    let reaches = vec![r1, reach(2, 0, 2)];
    let p = params(&[], true, true);
    let dt = 3600.0;
    let mut sim = simulation(reaches, p, dt);

    let (mut no3_in, mut no3_out) = (0.0, 0.0);
    let (mut sed_in, mut sed_out) = (0.0, 0.0);
    for step in 0..6 {
        let loaded = step < 3;
        let mut forcing = StepForcing::new(2);
        if loaded {
            let l = &mut forcing.reaches[1];
            l.qs = 2.0;
            l.sur_no3 = 10.0;
            l.sediment = 500.0;
        }
        let nut_before: Vec<NutrientState> = sim.nutrient().unwrap().to_vec();
        let sed_before: Vec<SedimentState> = sim.sediment().unwrap().to_vec();
        sim.step(&forcing).unwrap();

        let flow = sim.flow();
        let nut = sim.nutrient().unwrap();
        let sed = sim.sediment().unwrap();
        if loaded {
            assert_eq!(flow[1].storage, 0.0);
            assert_eq!(flow[1].depth, 0.0);
            assert_relative_eq!(flow[1].q_out, 4.0 / 3.0, max_relative = 1e-9);
            assert_eq!(nut[1].storage[Species::No3], 0.0);
            assert_relative_eq!(nut[1].outflow[Species::No3], 10.0, max_relative = 1e-9);
        }

        let no3_load = if loaded { 10.0 } else { 0.0 };
        let sed_load = if loaded { 500.0 } else { 0.0 };
        for (id, no3_input, sed_input) in [
            (1, no3_load, sed_load),
            (2, nut[1].outflow[Species::No3], sed[1].outflow),
        ] {
            assert_relative_eq!(
                nut_before[id].storage[Species::No3] + no3_input,
                nut[id].storage[Species::No3] + nut[id].outflow[Species::No3],
                max_relative = 1e-9,
                epsilon = 1e-9
            );
            let (b, a) = (&sed_before[id], &sed[id]);
            assert_relative_eq!(
                b.storage + b.bed_deposit + sed_input + a.degradation,
                a.storage + a.bed_deposit + a.outflow,
                max_relative = 1e-9,
                epsilon = 1e-5
            );
        }

        no3_in += no3_load;
        no3_out += nut[2].outflow[Species::No3];
        sed_in += sed_load + sed[1].degradation + sed[2].degradation;
        sed_out += sed[2].outflow;
    }

    let nut = sim.nutrient().unwrap();
    let sed = sim.sediment().unwrap();
    assert_eq!(sim.flow()[1].q_out, 0.0);
    assert_relative_eq!(
        no3_in,
        no3_out + nut[1].storage[Species::No3] + nut[2].storage[Species::No3],
        max_relative = 1e-9
    );
    let held: f64 = sed[1..].iter().map(|s| s.storage + s.bed_deposit).sum();
    assert_relative_eq!(sed_in, sed_out + held, max_relative = 1e-9, epsilon = 1e-4);
    assert!(no3_out > 0.0);
}

#[test]
fn stream_order_layering_rejects_misordered_networks() {
    // 1 -> 2 but both share stream order 1
    let reaches = vec![reach(1, 2, 1), reach(2, 0, 1)];
    assert!(NetworkTopology::build(&reaches, LayeringMethod::StreamOrder).is_err());
    let topo = NetworkTopology::build(&reaches, LayeringMethod::Topological).unwrap();
    assert_eq!(topo.layers, vec![vec![1], vec![2]]);
}
