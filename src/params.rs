//! Basin-wide model parameters and reach calibration adjustments.
//!
//! Parameters arrive as loose `name = value` pairs. Everything is collected in
//! a [`ParamBuilder`] and validated in one place by [`ParamBuilder::finalize`],
//! which either yields a fully populated [`ModelParams`] or the first
//! configuration error it finds.

use crate::config::ReachParams;
use crate::error::{RouteError, RouteResult};
use std::collections::BTreeMap;
use std::str::FromStr;

const NODATA: f64 = -9999.0;

const FLOW_KEYS: &[&str] = &[
    "musk_x", "musk_co1", "epch", "bnk0", "chs0_perc", "a_bnk", "b_bnk", "vseep0", "gwrq",
];
const SEDIMENT_KEYS: &[&str] = &["p_rf", "spcon", "spexp", "vcrit", "sed_chi0", "vcd"];
const NUTRIENT_KEYS: &[&str] = &[
    "ai0", "ai1", "ai2", "ai3", "ai4", "ai5", "ai6", "lambda0", "lambda1", "lambda2", "k_l",
    "k_n", "k_p", "p_n", "tfact", "mumax", "rhoq", "igropt", "cod_n", "cod_k", "ch_onco",
    "ch_opco",
];

#[derive(Debug, Clone, PartialEq)]
pub struct FlowParams {
    /// Muskingum weighting factor, 0..=0.5
    pub musk_x: f64,
    /// weighting of bankfull vs. low-flow storage time constant
    pub musk_co1: f64,
    /// evaporation coefficient
    pub epch: f64,
    /// initial bank storage per unit reach length, m3/m
    pub bnk0: f64,
    /// initial channel storage as a fraction of bankfull depth
    pub chs0_perc: f64,
    /// bank flow recession constant
    pub a_bnk: f64,
    /// bank storage loss to groundwater
    pub b_bnk: f64,
    pub vseep0: f64,
    /// deep groundwater inflow added to every reach, m3/s
    pub gwrq: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SedimentParams {
    /// peak rate adjustment factor
    pub p_rf: f64,
    /// transport capacity coefficient
    pub spcon: f64,
    /// transport capacity exponent
    pub spexp: f64,
    /// critical velocity for deposition, m/s
    pub vcrit: f64,
    /// initial suspended sediment concentration, Mg/m3
    pub sed_chi0: f64,
    /// channel downcutting and widening
    pub vcd: bool,
}

/// How nitrogen and phosphorus limitation combine in the algal growth rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthLimitation {
    Multiplicative,
    LimitingNutrient,
    HarmonicMean,
}

impl GrowthLimitation {
    fn from_code(code: f64) -> Option<Self> {
        match code.round() as i64 {
            1 => Some(GrowthLimitation::Multiplicative),
            2 => Some(GrowthLimitation::LimitingNutrient),
            3 => Some(GrowthLimitation::HarmonicMean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NutrientParams {
    /// chlorophyll-a to algal biomass ratio
    pub ai0: f64,
    pub ai1: f64,
    pub ai2: f64,
    pub ai3: f64,
    pub ai4: f64,
    pub ai5: f64,
    pub ai6: f64,
    pub lambda0: f64,
    pub lambda1: f64,
    pub lambda2: f64,
    /// half-saturation for light, MJ/(m2*hr)
    pub k_l: f64,
    pub k_n: f64,
    pub k_p: f64,
    pub p_n: f64,
    pub tfact: f64,
    pub mumax: f64,
    pub rhoq: f64,
    pub growth: GrowthLimitation,
    pub cod_n: f64,
    pub cod_k: f64,
    pub ch_onco: Option<f64>,
    pub ch_opco: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub flow: FlowParams,
    pub sediment: Option<SedimentParams>,
    pub nutrient: Option<NutrientParams>,
}

#[derive(Debug, Clone, Default)]
pub struct ParamBuilder {
    values: BTreeMap<String, f64>,
    sediment: bool,
    nutrient: bool,
}

impl ParamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: f64) -> RouteResult<&mut Self> {
        let key = name.trim().to_ascii_lowercase();
        let known = FLOW_KEYS
            .iter()
            .chain(SEDIMENT_KEYS)
            .chain(NUTRIENT_KEYS)
            .any(|k| *k == key);
        if !known {
            return Err(RouteError::UnknownParameter(name.to_string()));
        }
        self.values.insert(key, value);
        Ok(self)
    }

    pub fn with_sediment(&mut self, enabled: bool) -> &mut Self {
        self.sediment = enabled;
        self
    }

    pub fn with_nutrient(&mut self, enabled: bool) -> &mut Self {
        self.nutrient = enabled;
        self
    }

    fn required(&self, name: &str) -> RouteResult<f64> {
        match self.values.get(name) {
            Some(v) if *v != NODATA && v.is_finite() => Ok(*v),
            _ => Err(RouteError::MissingParameter(name.to_string())),
        }
    }

    fn optional(&self, name: &str) -> Option<f64> {
        self.values
            .get(name)
            .copied()
            .filter(|v| *v != NODATA && v.is_finite())
    }

    fn positive(&self, name: &str) -> RouteResult<f64> {
        let value = self.required(name)?;
        if value <= 0.0 {
            return Err(invalid(name, value, "must be positive"));
        }
        Ok(value)
    }

    fn non_negative(&self, name: &str) -> RouteResult<f64> {
        let value = self.required(name)?;
        if value < 0.0 {
            return Err(invalid(name, value, "must not be negative"));
        }
        Ok(value)
    }

    fn fraction(&self, name: &str, max: f64) -> RouteResult<f64> {
        let value = self.required(name)?;
        if !(0.0..=max).contains(&value) {
            return Err(invalid(name, value, "out of range"));
        }
        Ok(value)
    }

    /// Validate everything at once and build the typed parameter set.
    pub fn finalize(&self) -> RouteResult<ModelParams> {
        let flow = FlowParams {
            musk_x: self.fraction("musk_x", 0.5)?,
            musk_co1: self.fraction("musk_co1", 1.0)?,
            epch: self.non_negative("epch")?,
            bnk0: self.non_negative("bnk0")?,
            chs0_perc: self.fraction("chs0_perc", 1.0)?,
            a_bnk: self.non_negative("a_bnk")?,
            b_bnk: self.non_negative("b_bnk")?,
            vseep0: self.optional("vseep0").unwrap_or(0.0),
            gwrq: self.optional("gwrq").unwrap_or(0.0).max(0.0),
        };

        let sediment = if self.sediment {
            Some(SedimentParams {
                p_rf: self.positive("p_rf")?,
                spcon: self.positive("spcon")?,
                spexp: self.positive("spexp")?,
                vcrit: self.non_negative("vcrit")?,
                sed_chi0: self.non_negative("sed_chi0")?,
                vcd: self.optional("vcd").is_some_and(|v| v == 1.0),
            })
        } else {
            None
        };

        let nutrient = if self.nutrient {
            let code = self.positive("igropt")?;
            let growth = GrowthLimitation::from_code(code)
                .ok_or_else(|| invalid("igropt", code, "expected 1, 2 or 3"))?;
            Some(NutrientParams {
                ai0: self.positive("ai0")?,
                ai1: self.positive("ai1")?,
                ai2: self.positive("ai2")?,
                ai3: self.positive("ai3")?,
                ai4: self.positive("ai4")?,
                ai5: self.positive("ai5")?,
                ai6: self.positive("ai6")?,
                lambda0: self.positive("lambda0")?,
                lambda1: self.positive("lambda1")?,
                lambda2: self.positive("lambda2")?,
                // read as kJ/(m2*min), used as MJ/(m2*hr)
                k_l: self.positive("k_l")? * 1.0e-3 * 60.0,
                k_n: self.positive("k_n")?,
                k_p: self.positive("k_p")?,
                p_n: self.positive("p_n")?,
                tfact: self.positive("tfact")?,
                mumax: self.positive("mumax")?,
                rhoq: self.non_negative("rhoq")?,
                growth,
                cod_n: self.positive("cod_n")?,
                cod_k: self.positive("cod_k")?,
                ch_onco: self.optional("ch_onco"),
                ch_opco: self.optional("ch_opco"),
            })
        } else {
            None
        };

        Ok(ModelParams {
            flow,
            sediment,
            nutrient,
        })
    }
}

fn invalid(name: &str, value: f64, reason: &'static str) -> RouteError {
    RouteError::InvalidParameter {
        name: name.to_string(),
        value,
        reason,
    }
}

/// Kind of change a calibration row applies to a reach parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamChange {
    /// multiply by impact
    Relative,
    /// add impact
    Absolute,
    /// replace with impact
    Value,
    /// leave unchanged
    None,
}

impl FromStr for ParamChange {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RC" => Ok(ParamChange::Relative),
            "AC" => Ok(ParamChange::Absolute),
            "VC" => Ok(ParamChange::Value),
            "NC" | "" => Ok(ParamChange::None),
            other => Err(RouteError::Configuration(format!(
                "unknown parameter change `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub name: String,
    pub change: ParamChange,
    pub impact: f64,
}

impl Adjustment {
    fn is_identity(&self) -> bool {
        match self.change {
            ParamChange::Relative => self.impact == 1.0,
            ParamChange::Absolute => self.impact == 0.0,
            ParamChange::Value => self.impact == NODATA,
            ParamChange::None => true,
        }
    }

    fn apply(&self, value: f64) -> f64 {
        match self.change {
            ParamChange::Relative => value * self.impact,
            ParamChange::Absolute => value + self.impact,
            ParamChange::Value => self.impact,
            ParamChange::None => value,
        }
    }
}

/// Apply calibration adjustments to every reach before the run starts.
pub fn apply_adjustments(reaches: &mut [ReachParams], adjustments: &[Adjustment]) -> RouteResult<()> {
    for adj in adjustments {
        if adj.is_identity() {
            continue;
        }
        for reach in reaches.iter_mut() {
            let field = reach
                .field_mut(&adj.name)
                .ok_or_else(|| RouteError::UnknownParameter(adj.name.clone()))?;
            *field = adj.apply(*field);
        }
        log::debug!("applied {:?} {} to `{}`", adj.change, adj.impact, adj.name);
    }
    Ok(())
}
