//! Muskingum routing kernel and trapezoidal channel hydraulics.
//!
//! Storage constant from reach length and celerity:
//! `K = (4.64 - 3.64 * co1) * L / (5 * v0 / 3)`, which blends bankfull and
//! low-flow travel times.

/// Velocity substituted when a reach reports zero initial velocity, m/s.
pub const MIN_VELOCITY: f64 = 1.0e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MuskingumWeights {
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
    /// substep length, s
    pub dt: f64,
    pub substeps: usize,
}

/// Storage time constant K in seconds.
pub fn storage_constant(length: f64, velocity: f64, co1: f64) -> f64 {
    let v0 = if velocity == 0.0 { MIN_VELOCITY } else { velocity };
    (4.64 - 3.64 * co1) * length / (5.0 * v0 / 3.0)
}

/// Split `timestep` into equal substeps no longer than `max`.
pub fn substep(timestep: f64, max: f64) -> (f64, usize) {
    if max >= timestep || max <= 0.0 {
        return (timestep, 1);
    }
    let mut n = ((timestep / max) as usize).max(1);
    let mut dt = timestep / n as f64;
    if dt > max {
        n += 1;
        dt = timestep / n as f64;
    }
    (dt, n)
}

pub fn muskingum_weights(length: f64, velocity: f64, x: f64, co1: f64, timestep: f64) -> MuskingumWeights {
    let k = storage_constant(length, velocity, co1);
    let min = 2.0 * k * x;
    let max = 2.0 * k * (1.0 - x);
    let (dt, substeps) = substep(timestep, max);

    let temp = max + dt;
    let mut w = MuskingumWeights {
        c1: (dt - min) / temp,
        c2: (dt + min) / temp,
        c3: (max - dt) / temp,
        dt,
        substeps,
    };

    // keep every coefficient non-negative without changing their sum
    if w.c1 < 0.0 {
        w.c2 += w.c1;
        w.c1 = 0.0;
    }
    if w.c3 < 0.0 {
        w.c2 += w.c3;
        w.c3 = 0.0;
    }
    w
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutedFlow {
    /// mean outflow over the substeps, m3/s
    pub q_out: f64,
    /// storage at the end of the step, m3
    pub storage: f64,
    /// true if an outflow had to be cut back to keep storage at zero
    pub limited: bool,
    /// volume created by cutting an outflow below zero, m3
    pub shortfall: f64,
}

/// Route one timestep through `weights.substeps` substeps.
///
/// `loss` is the volume removed from the channel this timestep and is spread
/// evenly over the substeps.
pub fn route_substeps(
    weights: &MuskingumWeights,
    q_in: f64,
    mut q_in_prev: f64,
    mut q_out: f64,
    mut storage: f64,
    loss: f64,
    timestep: f64,
) -> RoutedFlow {
    let loss_rate = loss / timestep;
    let mut total = 0.0;
    let mut limited = false;
    let mut shortfall = 0.0;

    for _ in 0..weights.substeps {
        q_out = weights.c1 * q_in + weights.c2 * q_in_prev + weights.c3 * q_out;
        q_in_prev = q_in;
        let next = storage + (q_in - loss_rate - q_out) * weights.dt;
        if next < 0.0 {
            // drain exactly what is there
            let drained = storage / weights.dt + q_in - loss_rate;
            if drained < 0.0 {
                shortfall += -drained * weights.dt;
            }
            q_out = drained.max(0.0);
            storage = 0.0;
            limited = true;
        } else {
            storage = next;
        }
        total += q_out;
    }

    RoutedFlow {
        q_out: total / weights.substeps as f64,
        storage,
        limited,
        shortfall,
    }
}

/// Cross-section area of a trapezoid filled to `depth`.
pub fn trapezoid_area(bottom: f64, side_slope: f64, depth: f64) -> f64 {
    depth * (bottom + side_slope * depth)
}

/// Positive root of `z*d^2 + b*d - area = 0`.
pub fn trapezoid_depth(bottom: f64, side_slope: f64, area: f64) -> f64 {
    if area <= 0.0 {
        return 0.0;
    }
    if side_slope <= 0.0 {
        return if bottom > 0.0 { area / bottom } else { 0.0 };
    }
    ((bottom * bottom + 4.0 * side_slope * area).sqrt() - bottom) / (2.0 * side_slope)
}
