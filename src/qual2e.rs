//! QUAL2E in-stream kinetics on concentrations (mg/L).
//!
//! Rates are given at 20 deg C and corrected with `r20 * theta^(T - 20)`.

use crate::config::ReachParams;
use crate::params::{GrowthLimitation, NutrientParams};
use crate::state::{Species, SpeciesVec};

// temperature adjustment factors
const THBC1: f64 = 1.083;
const THBC2: f64 = 1.047;
const THBC3: f64 = 1.04;
const THBC4: f64 = 1.047;
const THGRA: f64 = 1.047;
const THRHO: f64 = 1.047;
const THRK1: f64 = 1.047;
const THRK2: f64 = 1.024;
const THRK3: f64 = 1.024;
const THRK4: f64 = 1.060;
const THRS1: f64 = 1.024;
const THRS2: f64 = 1.074;
const THRS3: f64 = 1.074;
const THRS4: f64 = 1.024;
const THRS5: f64 = 1.024;

/// Growth of any species within one step is capped at this multiple.
const GROWTH_CAP: f64 = 3.0;
const MAX_ALGAE: f64 = 5000.0;
const MIN_DEPTH: f64 = 0.01;

pub fn cor_temp(r20: f64, theta: f64, temp: f64) -> f64 {
    r20 * theta.powf(temp - 20.0)
}

/// Oxygen saturation concentration in fresh water, mg/L (APHA 1985).
pub fn saturation_oxygen(temp: f64) -> f64 {
    let tk = temp + 273.15;
    let ww = -139.34410 + 1.575701e5 / tk;
    let xx = 6.642308e7 / tk.powi(2);
    let yy = 1.243800e10 / tk.powi(3);
    let zz = 8.621949e11 / tk.powi(4);
    let sat = (ww - xx + yy - zz).exp();
    if sat < 1.0e-6 { 0.0 } else { sat }
}

/// Reach-specific rate constants at 20 deg C.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReachRates {
    pub bc1: f64,
    pub bc2: f64,
    pub bc3: f64,
    pub bc4: f64,
    pub rk1: f64,
    pub rk2: f64,
    pub rk3: f64,
    pub rk4: f64,
    pub rs1: f64,
    pub rs2: f64,
    pub rs3: f64,
    pub rs4: f64,
    pub rs5: f64,
}

impl From<&ReachParams> for ReachRates {
    fn from(r: &ReachParams) -> Self {
        ReachRates {
            bc1: r.bc1,
            bc2: r.bc2,
            bc3: r.bc3,
            bc4: r.bc4,
            rk1: r.rk1,
            rk2: r.rk2,
            rk3: r.rk3,
            rk4: r.rk4,
            rs1: r.rs1,
            rs2: r.rs2,
            rs3: r.rs3,
            rs4: r.rs4,
            rs5: r.rs5,
        }
    }
}

/// Conditions in the reach during the step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    /// deg C
    pub water_temp: f64,
    /// hr
    pub day_length: f64,
    /// MJ/m2
    pub solar_radiation: f64,
    /// m
    pub depth: f64,
    /// step length in days
    pub tday: f64,
}

impl GrowthLimitation {
    fn growth_rate(self, mumax: f64, fll: f64, fnn: f64, fpp: f64) -> f64 {
        match self {
            GrowthLimitation::Multiplicative => mumax * fll * fnn * fpp,
            GrowthLimitation::LimitingNutrient => mumax * fll * fnn.min(fpp),
            GrowthLimitation::HarmonicMean => {
                if fnn > 1.0e-6 && fpp > 1.0e-6 {
                    mumax * fll * 2.0 / (1.0 / fnn + 1.0 / fpp)
                } else {
                    0.0
                }
            }
        }
    }
}

/// Apply one step of kinetics to `conc` in place. Returns the oxygen
/// saturation concentration used.
pub fn transform(conc: &mut SpeciesVec, rates: &ReachRates, env: &Environment, p: &NutrientParams) -> f64 {
    let depth = env.depth.max(MIN_DEPTH);
    let wtmp = env.water_temp.max(0.1);
    let tday = env.tday;
    let ct = |r20: f64, theta: f64| cor_temp(r20, theta, wtmp);

    let mut algcon = conc[Species::Algae];
    let orgncon = conc[Species::OrgN];
    let mut nh4con = conc[Species::Nh4];
    let mut no2con = conc[Species::No2];
    let no3con = conc[Species::No3];
    let orgpcon = conc[Species::OrgP];
    let solpcon = conc[Species::SolP];
    let mut cbodcon = conc[Species::Cod];
    let o2con = conc[Species::DOx].clamp(0.001, 30.0);

    let sat_do = saturation_oxygen(wtmp);
    let cordo = 1.0 - (-0.6 * o2con).exp();
    let bc1mod = rates.bc1 * cordo;
    let bc2mod = rates.bc2 * cordo;

    // light extinction
    let chla = p.ai0 * algcon;
    let mut lambda = if chla > 1.0e-6 {
        p.lambda0 + p.lambda1 * chla + p.lambda2 * chla.powf(0.66667)
    } else {
        p.lambda0
    };
    if lambda > p.lambda0 {
        lambda = p.lambda0;
    }

    let cinn = nh4con + no3con;
    let fnn = cinn / (cinn + p.k_n);
    let fpp = solpcon / (solpcon + p.k_p);

    let algi = if env.day_length > 0.0 {
        env.solar_radiation * p.tfact / env.day_length
    } else {
        1.0e-5
    };
    let fl_1 = 1.0 / (lambda * depth)
        * ((p.k_l + algi) / (p.k_l + algi * (-lambda * depth).exp())).ln();
    let fll = 0.92 * (env.day_length / 24.0) * fl_1;
    let gra = p.growth.growth_rate(p.mumax, fll, fnn, fpp);
    let gra_t = ct(gra, THGRA);
    let rho_t = ct(p.rhoq, THRHO);

    // algae
    let setl = (ct(rates.rs1, THRS1) / depth).min(1.0);
    let mut dalgae = algcon + (gra_t * algcon - rho_t * algcon - setl * algcon) * tday;
    if dalgae < 1.0e-6 {
        dalgae = 1.0e-6;
    }
    dalgae = dalgae.min(MAX_ALGAE).min(GROWTH_CAP * algcon);

    // carbonaceous BOD, carried as COD
    let cod_factor = p.cod_n * (1.0 - (-5.0 * p.cod_k).exp());
    cbodcon /= cod_factor;
    let mut dbod = cbodcon - (ct(rates.rk1, THRK1) + ct(rates.rk3, THRK3)) * cbodcon * tday;
    if dbod < 1.0e-6 {
        dbod = 1.0e-6;
    }
    dbod *= cod_factor;

    // dissolved oxygen
    let uu = ct(rates.rk2, THRK2) * (sat_do - o2con);
    let vv = if algcon > 0.001 {
        (p.ai3 * gra_t - p.ai4 * rho_t) * algcon
    } else {
        algcon = 0.001;
        0.0
    };
    let ww = ct(rates.rk1, THRK1) * cbodcon;
    let xx = if depth > 0.001 {
        ct(rates.rk4, THRK4) / (depth * 1000.0)
    } else {
        0.0
    };
    let yy = if nh4con > 0.001 {
        p.ai5 * ct(bc1mod, THBC1) * nh4con
    } else {
        nh4con = 0.001;
        0.0
    };
    let zz = if no2con > 0.001 {
        p.ai6 * ct(bc2mod, THBC2) * no2con
    } else {
        no2con = 0.001;
        0.0
    };
    let mut ddisox = o2con + (uu + vv - ww - xx - yy - zz) * tday;
    if ddisox.is_nan() || ddisox < 0.1 {
        ddisox = 0.1;
    }

    // organic N
    let mut dorgn = orgncon
        + (p.ai1 * rho_t * algcon - ct(rates.bc3, THBC3) * orgncon - ct(rates.rs4, THRS4) * orgncon)
            * tday;
    if dorgn < 1.0e-6 {
        dorgn = 0.0;
    }
    dorgn = dorgn.min(GROWTH_CAP * orgncon);

    // fraction of algal N uptake taken from ammonium
    let f1 = p.p_n * nh4con / (p.p_n * nh4con + (1.0 - p.p_n) * no3con + 1.0e-6);

    let mut dnh4 = nh4con
        + (ct(rates.bc3, THBC3) * orgncon - ct(bc1mod, THBC1) * nh4con
            + ct(rates.rs3, THRS3) / (depth * 1000.0)
            - f1 * p.ai1 * algcon * gra_t)
            * tday;
    if dnh4 < 1.0e-6 {
        dnh4 = 0.0;
    }
    if nh4con > 0.0 {
        dnh4 = dnh4.min(GROWTH_CAP * nh4con);
    }

    let mut dno2 = no2con + (ct(bc1mod, THBC1) * nh4con - ct(bc2mod, THBC2) * no2con) * tday;
    if dno2 < 1.0e-6 {
        dno2 = 0.0;
    }
    if no2con > 0.0 {
        dno2 = dno2.min(GROWTH_CAP * no2con);
    }

    let mut dno3 =
        no3con + (ct(bc2mod, THBC2) * no2con - (1.0 - f1) * p.ai1 * algcon * gra_t) * tday;
    if dno3 < 1.0e-6 {
        dno3 = 0.0;
    }

    // phosphorus
    let mut dorgp = orgpcon
        + (p.ai2 * rho_t * algcon - ct(rates.bc4, THBC4) * orgpcon - ct(rates.rs5, THRS5) * orgpcon)
            * tday;
    if dorgp < 1.0e-6 {
        dorgp = 0.0;
    }
    dorgp = dorgp.min(GROWTH_CAP * orgpcon);

    let mut dsolp = solpcon
        + (ct(rates.bc4, THBC4) * orgpcon + ct(rates.rs2, THRS2) / (depth * 1000.0)
            - p.ai2 * gra_t * algcon)
            * tday;
    if dsolp < 1.0e-6 {
        dsolp = 0.0;
    }
    dsolp = dsolp.min(GROWTH_CAP * solpcon);

    conc[Species::Algae] = dalgae;
    conc[Species::OrgN] = dorgn;
    conc[Species::Nh4] = dnh4;
    conc[Species::No2] = dno2;
    conc[Species::No3] = dno3;
    conc[Species::OrgP] = dorgp;
    conc[Species::SolP] = dsolp;
    conc[Species::Cod] = dbod;
    conc[Species::DOx] = ddisox;
    sat_do
}
