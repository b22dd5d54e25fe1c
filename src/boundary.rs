use crate::config::{BoundaryPolicy, GeometryMode, LeftBoundaryPolicy};
use crate::ensemble::{ColumnSide, Ensemble, Region, Status};
use crate::noise::{Channel, RandomField};
use crate::sim_params::SimParams;
use anyhow::Result;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// Cap on the corrective re-reflection loop. A position still outside the
/// domain after this many mirrors signals a parameter inconsistency (step
/// size far too large for the wall spacing) and aborts the run.
const MAX_REFLECT_ITERS: u32 = 64;

/// Per-step aggregate counts produced by boundary resolution.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallStats {
    /// Wall impacts seen under the absorbing policy (candidates, adsorbed or not).
    pub impacts: u32,
    /// Particles that hit the left boundary this step.
    pub left_hits: u32,
}

/// Outcome of resolving one particle, aggregated by the parallel driver.
#[derive(Debug, Default, Clone, Copy)]
struct ParticleOutcome {
    impact: bool,
    left_hit: bool,
    anomaly: bool,
}

/// Resolves wall crossings for the whole ensemble after displacement.
///
/// For each Active particle, strictly in order: candidate-crossing detection
/// from the previous confirmed region, one probability roll per candidate,
/// geometric correction (mirror plus bounded corrective loop) or adsorption
/// clamp, left-boundary handling on the orthogonal axis, and finally the
/// authoritative region recomputation that feeds the next step.
pub fn resolve<F: RandomField>(
    params: &SimParams,
    ensemble: &mut Ensemble,
    field: &F,
    step: u32,
) -> Result<WallStats> {
    let impacts = AtomicU32::new(0);
    let left_hits = AtomicU32::new(0);
    let anomalies = AtomicU32::new(0);

    let Ensemble {
        x,
        y,
        region,
        side,
        status,
        ..
    } = ensemble;

    x.par_iter_mut()
        .zip(y.par_iter_mut())
        .zip(region.par_iter_mut())
        .zip(side.par_iter_mut())
        .zip(status.par_iter_mut())
        .enumerate()
        .for_each(|(idx, ((((px, py), reg), sd), st))| {
            if *st != Status::Active {
                return;
            }
            let outcome = resolve_particle(params, field, idx, step, px, py, reg, sd, st);
            if outcome.impact {
                impacts.fetch_add(1, Ordering::Relaxed);
            }
            if outcome.left_hit {
                left_hits.fetch_add(1, Ordering::Relaxed);
            }
            if outcome.anomaly {
                anomalies.fetch_add(1, Ordering::Relaxed);
            }
        });

    let anomalies = anomalies.load(Ordering::Relaxed);
    if anomalies > 0 {
        anyhow::bail!(
            "Corrective reflection failed to restore {} particle(s) into the domain \
             within {} iterations at step {}; the step size is inconsistent with the wall spacing",
            anomalies,
            MAX_REFLECT_ITERS,
            step
        );
    }

    Ok(WallStats {
        impacts: impacts.load(Ordering::Relaxed),
        left_hits: left_hits.load(Ordering::Relaxed),
    })
}

/// Full disposition of a single particle. Pure per-particle logic, no shared
/// state, which is what makes the parallel sweep valid.
#[allow(clippy::too_many_arguments)]
fn resolve_particle<F: RandomField>(
    params: &SimParams,
    field: &F,
    idx: usize,
    step: u32,
    px: &mut f64,
    py: &mut f64,
    region: &mut Region,
    side: &mut ColumnSide,
    status: &mut Status,
) -> ParticleOutcome {
    let mut out = ParticleOutcome::default();

    match params.mode {
        GeometryMode::Fracture => {
            if params.left_policy != LeftBoundaryPolicy::Open {
                resolve_left_boundary(params, px, status, &mut out);
            }
            if *status == Status::Active {
                resolve_vertical(params, field, idx, step, py, region, status, &mut out);
            }
        }
        GeometryMode::Columns => {
            resolve_columns(params, field, idx, step, px, side, &mut out);
            resolve_vertical(params, field, idx, step, py, region, status, &mut out);
        }
    }

    // Re-derive membership from the corrected position. This recomputation is
    // the only writer of `region` besides initialization.
    if matches!(*status, Status::Active) {
        match Region::classify(*py, params.lower_wall, params.upper_wall) {
            Some(r) => *region = r,
            // Exactly on a wall: terminal, avoids oscillation at the boundary.
            None => *status = Status::Absorbed,
        }
    }
    if params.mode == GeometryMode::Columns && *px != params.column_mid {
        *side = if *px < params.column_mid {
            ColumnSide::Left
        } else {
            ColumnSide::Right
        };
    }

    out
}

/// Vertical wall machinery shared by both geometries: candidate detection
/// from the previous confirmed region, the crossing roll, and the dispatch to
/// the configured wall policy.
fn resolve_vertical<F: RandomField>(
    params: &SimParams,
    field: &F,
    idx: usize,
    step: u32,
    py: &mut f64,
    region: &mut Region,
    status: &mut Status,
    out: &mut ParticleOutcome,
) {
    let (lby, uby) = (params.lower_wall, params.upper_wall);

    // Candidate crossings are gated by the prior region, so a particle can be
    // an out-crossing candidate or an in-crossing candidate, never both.
    enum Candidate {
        OutAbove,
        OutBelow,
        InFromAbove,
        InFromBelow,
    }
    let candidate = match *region {
        Region::Fracture if *py > uby => Some(Candidate::OutAbove),
        Region::Fracture if *py < lby => Some(Candidate::OutBelow),
        Region::MatrixAbove if *py < uby && *py > lby => Some(Candidate::InFromAbove),
        Region::MatrixBelow if *py > lby && *py < uby => Some(Candidate::InFromBelow),
        _ => None,
    };
    let Some(candidate) = candidate else {
        return;
    };

    match candidate {
        Candidate::OutAbove | Candidate::OutBelow => {
            let wall = if matches!(candidate, Candidate::OutAbove) {
                uby
            } else {
                lby
            };
            match params.boundary_policy {
                BoundaryPolicy::Reflecting => {
                    let roll = field.uniform(idx, step, Channel::CrossingRoll);
                    if roll > params.reflected_inward {
                        // Transmission: the displaced position stands and the
                        // region recomputation flips the membership.
                    } else {
                        mirror_into_band(py, lby, uby, wall, out);
                    }
                }
                BoundaryPolicy::Absorbing => {
                    out.impact = true;
                    let roll = field.uniform(idx, step, Channel::AdsorptionRoll);
                    if roll <= params.adsorption_probability {
                        // Bit-exact clamp onto the wall coordinate.
                        *py = wall;
                        *status = Status::Absorbed;
                    } else {
                        mirror_into_band(py, lby, uby, wall, out);
                    }
                }
            }
        }
        Candidate::InFromAbove | Candidate::InFromBelow => {
            // The absorbing policy only disposes of fracture-side impacts;
            // matrix-side returns transmit freely under it.
            if params.boundary_policy == BoundaryPolicy::Reflecting {
                let roll = field.uniform(idx, step, Channel::CrossingRoll);
                if roll > params.reflected_outward {
                    // Transmission into the fracture.
                } else {
                    let wall = if matches!(candidate, Candidate::InFromAbove) {
                        uby
                    } else {
                        lby
                    };
                    // A single mirror from inside the band always lands back
                    // in the matrix region; no corrective loop is needed.
                    *py = 2.0 * wall - *py;
                }
            }
        }
    }
}

/// Mirrors an out-of-band coordinate about `wall`, then keeps re-mirroring
/// against whichever wall is still violated until the coordinate lies within
/// [lower, upper]. Large steps can overshoot past the opposite wall, which a
/// single naive mirror does not fix.
fn mirror_into_band(coord: &mut f64, lower: f64, upper: f64, wall: f64, out: &mut ParticleOutcome) {
    *coord = 2.0 * wall - *coord;
    let mut iters = 0;
    while *coord < lower || *coord > upper {
        if *coord > upper {
            *coord = 2.0 * upper - *coord;
        } else {
            *coord = 2.0 * lower - *coord;
        }
        iters += 1;
        if iters >= MAX_REFLECT_ITERS {
            out.anomaly = true;
            return;
        }
    }
}

/// Horizontal left boundary (fracture mode only). Applied along the
/// orthogonal axis, so it never interacts with the vertical wall logic.
fn resolve_left_boundary(
    params: &SimParams,
    px: &mut f64,
    status: &mut Status,
    out: &mut ParticleOutcome,
) {
    let lbx = params.left_boundary;
    if *px >= lbx {
        return;
    }
    out.left_hit = true;
    match params.left_policy {
        LeftBoundaryPolicy::Reflecting => {
            *px = 2.0 * lbx - *px;
        }
        LeftBoundaryPolicy::Absorbing => {
            *px = lbx;
            *status = Status::AbsorbedLeft;
        }
        LeftBoundaryPolicy::Open => unreachable!("gated by the caller"),
    }
}

/// Columns-mode horizontal machinery: fully reflecting outer walls and a
/// central partition crossed with per-direction transmission probabilities.
fn resolve_columns<F: RandomField>(
    params: &SimParams,
    field: &F,
    idx: usize,
    step: u32,
    px: &mut f64,
    side: &mut ColumnSide,
    out: &mut ParticleOutcome,
) {
    let (lbx, cbx, rbx) = (params.column_left, params.column_mid, params.column_right);

    // Outer walls first: unconditional reflection back into the column pair.
    if *px < lbx {
        mirror_into_band(px, lbx, rbx, lbx, out);
    } else if *px > rbx {
        mirror_into_band(px, lbx, rbx, rbx, out);
    }

    // Central partition, gated by the previous confirmed side.
    match *side {
        ColumnSide::Left if *px > cbx => {
            let roll = field.uniform(idx, step, Channel::ColumnRoll);
            if roll > params.reflected_left_to_right {
                // Transmission: the side recomputation flips the membership.
            } else {
                mirror_into_band(px, lbx, rbx, cbx, out);
            }
        }
        ColumnSide::Right if *px < cbx => {
            let roll = field.uniform(idx, step, Channel::ColumnRoll);
            if roll > params.reflected_right_to_left {
                // Transmission.
            } else {
                mirror_into_band(px, lbx, rbx, cbx, out);
            }
        }
        _ => {}
    }
}
