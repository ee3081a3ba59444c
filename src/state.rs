use crate::config::ReachParams;
use crate::mc_kernel::{trapezoid_area, trapezoid_depth};
use crate::params::{FlowParams, ModelParams};
use std::ops::{Index, IndexMut};

const UTIL_ZERO: f64 = 1.0e-6;

/// Channel cross-section. Mutable through the run because downcutting can
/// deepen the channel and flatten its bed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelGeometry {
    pub length: f64,
    pub bankfull_width: f64,
    pub bankfull_depth: f64,
    pub bottom_width: f64,
    pub side_slope: f64,
    pub slope: f64,
    width_depth_ratio: f64,
}

impl ChannelGeometry {
    pub fn from_reach(reach: &ReachParams) -> Self {
        let mut side_slope = reach.side_slope;
        let mut bottom_width = reach.width - 2.0 * side_slope * reach.depth;
        if bottom_width <= UTIL_ZERO {
            bottom_width = 0.5 * reach.width;
            side_slope = if reach.depth > 0.0 {
                (reach.width - bottom_width) * 0.5 / reach.depth
            } else {
                0.0
            };
        }
        ChannelGeometry {
            length: reach.length,
            bankfull_width: reach.width,
            bankfull_depth: reach.depth,
            bottom_width,
            side_slope,
            slope: reach.slope,
            width_depth_ratio: if reach.depth > 0.0 {
                reach.width / reach.depth
            } else {
                0.0
            },
        }
    }

    /// Water depth holding `storage` m3 over the reach length.
    pub fn depth_for_storage(&self, storage: f64) -> f64 {
        if self.length <= 0.0 || storage <= 0.0 {
            return 0.0;
        }
        trapezoid_depth(self.bottom_width, self.side_slope, storage / self.length)
    }

    pub fn top_width(&self, depth: f64) -> f64 {
        if depth < UTIL_ZERO {
            self.bottom_width
        } else {
            self.bottom_width + 2.0 * self.side_slope * depth
        }
    }

    pub fn storage_at_depth(&self, depth: f64) -> f64 {
        self.length * trapezoid_area(self.bottom_width, self.side_slope, depth)
    }

    /// Deepen the channel by `cut` m, keeping the initial width/depth ratio.
    pub fn downcut(&mut self, cut: f64) {
        self.bankfull_depth += cut;
        self.bankfull_width = self.bankfull_depth * self.width_depth_ratio;
        if self.length > 0.0 {
            self.slope = (self.slope - cut / self.length).max(1.0e-4);
        }
        let bottom = self.bankfull_width - 2.0 * self.side_slope * self.bankfull_depth;
        if bottom <= UTIL_ZERO {
            self.bottom_width = 0.5 * self.bankfull_width;
            self.side_slope = (self.bankfull_width - self.bottom_width) * 0.5 / self.bankfull_depth;
        } else {
            self.bottom_width = bottom;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowState {
    /// channel water storage after routing, m3
    pub storage: f64,
    pub depth: f64,
    pub top_width: f64,
    /// m3
    pub bank_storage: f64,
    /// storage after inflow and losses, before routing
    pub pre_storage: f64,
    pub pre_depth: f64,
    /// total inflow of the last step, m3/s
    pub q_in: f64,
    /// m3/s
    pub q_out: f64,
    pub qs: f64,
    pub qi: f64,
    pub qg: f64,
    /// m3 per step
    pub seepage: f64,
    pub bank_gain: f64,
    pub bank_to_gw: f64,
    pub evaporation: f64,
    /// times a negative storage was clamped to zero
    pub clamped: u32,
}

impl FlowState {
    pub fn initial(geometry: &ChannelGeometry, params: &FlowParams) -> Self {
        let depth = geometry.bankfull_depth * params.chs0_perc;
        let storage = geometry.storage_at_depth(depth);
        FlowState {
            storage,
            depth,
            top_width: geometry.top_width(depth),
            bank_storage: params.bnk0 * geometry.length,
            pre_storage: storage,
            pre_depth: depth,
            ..Default::default()
        }
    }

    /// Routed water volume leaving the reach this step, m3.
    pub fn out_volume(&self, dt: f64) -> f64 {
        self.q_out * dt
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SedimentState {
    /// suspended sediment held in the reach, kg
    pub storage: f64,
    /// deposited bed material available for re-entrainment, kg
    pub bed_deposit: f64,
    pub cumulative_degradation: f64,
    /// kg per step
    pub outflow: f64,
    /// kg/m3
    pub concentration: f64,
    pub deposition: f64,
    /// channel bed erosion beyond the deposited layer, kg
    pub degradation: f64,
    pub clamped: u32,
}

impl SedimentState {
    pub fn initial(initial_conc: f64, water_storage: f64) -> Self {
        SedimentState {
            storage: initial_conc * water_storage * 1000.0,
            ..Default::default()
        }
    }
}

/// Constituents tracked by the water quality engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Species {
    Algae,
    OrgN,
    Nh4,
    No2,
    No3,
    OrgP,
    SolP,
    Cod,
    DOx,
}

impl Species {
    pub const ALL: [Species; 9] = [
        Species::Algae,
        Species::OrgN,
        Species::Nh4,
        Species::No2,
        Species::No3,
        Species::OrgP,
        Species::SolP,
        Species::Cod,
        Species::DOx,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Species::Algae => "algae",
            Species::OrgN => "orgn",
            Species::Nh4 => "nh4",
            Species::No2 => "no2",
            Species::No3 => "no3",
            Species::OrgP => "orgp",
            Species::SolP => "solp",
            Species::Cod => "cod",
            Species::DOx => "dox",
        }
    }
}

/// One value per species: a mass in kg or a concentration in mg/L.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeciesVec([f64; 9]);

impl SpeciesVec {
    pub fn total_n(&self) -> f64 {
        self[Species::OrgN] + self[Species::Nh4] + self[Species::No2] + self[Species::No3]
    }

    pub fn total_p(&self) -> f64 {
        self[Species::OrgP] + self[Species::SolP]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Species, f64)> + '_ {
        Species::ALL.into_iter().map(move |s| (s, self[s]))
    }

    pub fn scale(&self, factor: f64) -> SpeciesVec {
        SpeciesVec(self.0.map(|v| v * factor))
    }

    pub fn add_assign(&mut self, other: &SpeciesVec) {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a += b;
        }
    }
}

impl Index<Species> for SpeciesVec {
    type Output = f64;
    fn index(&self, s: Species) -> &f64 {
        &self.0[s as usize]
    }
}

impl IndexMut<Species> for SpeciesVec {
    fn index_mut(&mut self, s: Species) -> &mut f64 {
        &mut self.0[s as usize]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NutrientState {
    /// kg held in the reach after route-out
    pub storage: SpeciesVec,
    /// kg leaving the reach this step
    pub outflow: SpeciesVec,
    /// mg/L of the outflow
    pub outflow_conc: SpeciesVec,
    /// chlorophyll-a to algae ratio, carried for reporting
    pub ai0: f64,
    pub saturation_oxygen: f64,
    pub clamped: u32,
}

impl NutrientState {
    pub fn initial(reach: &ReachParams, water_storage: f64, ai0: f64) -> Self {
        let mut conc = SpeciesVec::default();
        conc[Species::Algae] = reach.algae;
        conc[Species::OrgN] = reach.orgn;
        conc[Species::Nh4] = reach.nh4;
        conc[Species::No2] = reach.no2;
        conc[Species::No3] = reach.no3;
        conc[Species::OrgP] = reach.orgp;
        conc[Species::SolP] = reach.solp;
        conc[Species::Cod] = reach.bod.max(1.0e-6);
        conc[Species::DOx] = reach.disox;
        NutrientState {
            storage: conc.scale(water_storage * 0.001),
            ai0,
            ..Default::default()
        }
    }

    pub fn chlora_outflow(&self) -> f64 {
        self.outflow[Species::Algae] * self.ai0
    }
}

/// All per-reach state, dense by reach id with slot 0 for the basin.
#[derive(Debug, Clone)]
pub struct ReachStates {
    pub geometry: Vec<ChannelGeometry>,
    pub flow: Vec<FlowState>,
    pub sediment: Option<Vec<SedimentState>>,
    pub nutrient: Option<Vec<NutrientState>>,
}

impl ReachStates {
    /// `reaches[id - 1]` must describe reach `id`.
    pub fn initial(reaches: &[ReachParams], params: &ModelParams) -> Self {
        let mut geometry = vec![ChannelGeometry::default()];
        geometry.extend(reaches.iter().map(ChannelGeometry::from_reach));

        let flow: Vec<FlowState> = geometry
            .iter()
            .enumerate()
            .map(|(id, g)| {
                if id == 0 {
                    FlowState::default()
                } else {
                    FlowState::initial(g, &params.flow)
                }
            })
            .collect();

        let sediment = params.sediment.as_ref().map(|sed| {
            flow.iter()
                .enumerate()
                .map(|(id, f)| {
                    if id == 0 {
                        SedimentState::default()
                    } else {
                        SedimentState::initial(sed.sed_chi0, f.storage)
                    }
                })
                .collect()
        });

        let nutrient = params.nutrient.as_ref().map(|nut| {
            let mut states = vec![NutrientState {
                ai0: nut.ai0,
                ..Default::default()
            }];
            states.extend(
                reaches
                    .iter()
                    .zip(&flow[1..])
                    .map(|(r, f)| NutrientState::initial(r, f.storage, nut.ai0)),
            );
            states
        });

        ReachStates {
            geometry,
            flow,
            sediment,
            nutrient,
        }
    }
}
