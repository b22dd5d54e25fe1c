use crate::ensemble::{Ensemble, Status};
use crate::sim_params::SimParams;
use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Spatial concentration profile captured once at the configured record time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialProfile {
    pub time: f64,
    pub bin_centers: Vec<f64>,
    /// Density-normalized counts (integrates to one over the binned range).
    pub density: Vec<f64>,
}

/// Survival-time distribution on one time grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalHistogram {
    pub bin_edges: Vec<f64>,
    /// Number of particles whose residence time exceeds each bin edge.
    pub live_counts: Vec<u32>,
    pub normalized: Vec<f64>,
}

/// End-of-run aggregate handed to external plotting/statistics collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub num_particles: usize,
    pub steps_taken: u32,
    pub dt: f64,
    pub stop_reason: String,
    pub execution_seconds: f64,
    pub escaped: usize,
    pub absorbed: usize,
    pub degraded: usize,
    pub impacts: u32,
    pub mean_arrival_time: Option<f64>,
    pub std_arrival_time: Option<f64>,
    pub breakthrough_pdf: Vec<u32>,
    pub left_boundary_pdf: Vec<u32>,
    pub spatial_profile: Option<SpatialProfile>,
    pub survival_linear: SurvivalHistogram,
    pub survival_log: SurvivalHistogram,
}

/// Collects per-step aggregates and final distributions. Reads ensemble
/// snapshots; never mutates particle state.
#[derive(Debug)]
pub struct Recorder {
    /// Per-step first-passage counts at the control plane.
    pub pdf_part: Vec<u32>,
    /// Per-step first-hit counts at the left boundary.
    pub pdf_left: Vec<u32>,
    arrived_total: u32,
    num_particles: usize,
    spatial_profile: Option<SpatialProfile>,
    trajectories: Option<Vec<Vec<(f64, f64)>>>,
}

impl Recorder {
    pub fn new(params: &SimParams, num_particles: usize) -> Self {
        let trajectories = if params.record_trajectories {
            // O(particles * steps) memory; gated by config for that reason.
            Some(Vec::with_capacity(params.num_steps as usize + 1))
        } else {
            None
        };
        Recorder {
            pdf_part: vec![0; params.num_steps as usize],
            pdf_left: vec![0; params.num_steps as usize],
            arrived_total: 0,
            num_particles,
            spatial_profile: None,
            trajectories,
        }
    }

    /// Records the aggregates of one completed step. The running arrival
    /// total and the pdf are updated together, so the CDF always agrees with
    /// the recorded breakthrough curve.
    pub fn record_step(&mut self, step: u32, newly_escaped: u32, left_hits: u32) {
        let idx = step as usize;
        debug_assert!(idx < self.pdf_part.len(), "step {} past the recorder", step);
        if idx < self.pdf_part.len() {
            self.pdf_part[idx] = newly_escaped;
            self.pdf_left[idx] = left_hits;
            self.arrived_total += newly_escaped;
        }
    }

    /// Cumulative breakthrough fraction so far.
    pub fn cdf(&self) -> f64 {
        self.arrived_total as f64 / self.num_particles as f64
    }

    /// Captures the spatial concentration profile when the clock passes the
    /// configured record time (at most once per run).
    pub fn maybe_capture_spatial(&mut self, params: &SimParams, t: f64, ensemble: &Ensemble) {
        if self.spatial_profile.is_some() {
            return;
        }
        if t <= params.spatial_record_time && params.spatial_record_time < t + params.dt {
            debug!("Capturing spatial concentration profile at t = {:.3}", t);
            let edges = crate::ensemble::linspace(
                -params.bins_x_interval,
                params.bins_x_interval,
                params.bins_space,
            );
            let (centers, density) = histogram_density(&ensemble.x, &edges);
            self.spatial_profile = Some(SpatialProfile {
                time: t,
                bin_centers: centers,
                density,
            });
        }
    }

    /// Appends one step's positions to the trajectory record, if enabled.
    pub fn record_trajectories(&mut self, ensemble: &Ensemble) {
        if let Some(paths) = self.trajectories.as_mut() {
            paths.push(ensemble.positions());
        }
    }

    pub fn trajectories(&self) -> Option<&[Vec<(f64, f64)>]> {
        self.trajectories.as_deref()
    }

    /// Per-particle arrival times rebuilt from the step-indexed breakthrough
    /// pdf, already sorted by construction.
    pub fn arrival_times(&self, dt: f64) -> Vec<f64> {
        let mut times = Vec::with_capacity(self.arrived_total as usize);
        for (step, &count) in self.pdf_part.iter().enumerate() {
            for _ in 0..count {
                times.push((step as f64 + 1.0) * dt);
            }
        }
        times
    }

    /// Survival-time histogram of residence times (step counts scaled by dt)
    /// against an increasing grid of bin edges.
    pub fn survival_histogram(
        &self,
        ensemble: &Ensemble,
        dt: f64,
        bin_edges: Vec<f64>,
    ) -> SurvivalHistogram {
        let live_counts: Vec<u32> = bin_edges
            .iter()
            .map(|&edge| {
                ensemble
                    .step_counts
                    .iter()
                    .filter(|&&steps| steps as f64 * dt > edge)
                    .count() as u32
            })
            .collect();
        // Normalize against the (left-padded) bin widths so the result is a
        // density over the binned interval.
        let mut weighted = 0.0;
        let mut prev = 0.0;
        for (&edge, &count) in bin_edges.iter().zip(live_counts.iter()) {
            weighted += count as f64 * (edge - prev);
            prev = edge;
        }
        let normalized = if weighted > 0.0 {
            live_counts.iter().map(|&c| c as f64 / weighted).collect()
        } else {
            vec![0.0; live_counts.len()]
        };
        SurvivalHistogram {
            bin_edges,
            live_counts,
            normalized,
        }
    }

    /// Assembles the end-of-run summary.
    pub fn summary(
        &self,
        params: &SimParams,
        ensemble: &Ensemble,
        steps_taken: u32,
        stop_reason: String,
        impacts: u32,
        execution_seconds: f64,
    ) -> RunSummary {
        let arrivals = self.arrival_times(params.dt);
        let (mean, std) = mean_std(&arrivals);

        let lin_edges = crate::ensemble::linspace(params.dt, params.sim_time, params.bins_time);
        let log_edges = logspace(params.dt, params.sim_time, params.bins_time);

        RunSummary {
            num_particles: ensemble.len(),
            steps_taken,
            dt: params.dt,
            stop_reason,
            execution_seconds,
            escaped: ensemble.escaped_count(),
            absorbed: ensemble.absorbed_count(),
            degraded: ensemble
                .status
                .iter()
                .filter(|s| **s == Status::Degraded)
                .count(),
            impacts,
            mean_arrival_time: mean,
            std_arrival_time: std,
            breakthrough_pdf: self.pdf_part.clone(),
            left_boundary_pdf: self.pdf_left.clone(),
            spatial_profile: self.spatial_profile.clone(),
            survival_linear: self.survival_histogram(ensemble, params.dt, lin_edges),
            survival_log: self.survival_histogram(ensemble, params.dt, log_edges),
        }
    }

    /// Writes the breakthrough curve as a plain two-column tab-separated
    /// table: sorted arrival time vs empirical cumulative fraction, one row
    /// per arrived particle.
    pub fn write_breakthrough_table<P: AsRef<Path>>(&self, path: P, dt: f64) -> Result<()> {
        let times = self.arrival_times(dt);
        let mut file = File::create(path.as_ref()).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create breakthrough table '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;
        let n = self.num_particles as f64;
        for (i, time) in times.iter().enumerate() {
            writeln!(file, "{}\t{}", time, (i as f64 + 1.0) / n)?;
        }
        info!(
            "Breakthrough table with {} arrivals written to {}",
            times.len(),
            path.as_ref().display()
        );
        Ok(())
    }
}

/// Writes final particle positions as CSV.
pub fn write_final_positions<P: AsRef<Path>>(path: P, positions: &[(f64, f64)]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref()).map_err(|e| {
        anyhow::anyhow!(
            "Failed to create positions CSV '{}': {}",
            path.as_ref().display(),
            e
        )
    })?;
    writer.write_record(["x", "y"])?;
    for (x, y) in positions {
        writer.write_record(&[format!("{:.6}", x), format!("{:.6}", y)])?;
    }
    writer.flush()?;
    info!("Final positions saved to {}", path.as_ref().display());
    Ok(())
}

/// Serializes the run summary in the configured format.
pub fn write_summary(summary: &RunSummary, base_filename: &str, format: &str) -> Result<()> {
    match format {
        "json" => {
            let filename = format!("{}_summary.json", base_filename);
            let mut file = File::create(&filename)?;
            let json_string = serde_json::to_string(summary)?;
            file.write_all(json_string.as_bytes())?;
            info!("Run summary saved to {}", filename);
        }
        "bincode" => {
            let filename = format!("{}_summary.bin", base_filename);
            let file = File::create(&filename)?;
            bincode::serialize_into(file, summary)?;
            info!("Run summary saved to {} (binary format)", filename);
        }
        "messagepack" => {
            let filename = format!("{}_summary.msgpack", base_filename);
            let mut file = File::create(&filename)?;
            rmp_serde::encode::write(&mut file, summary)?;
            info!("Run summary saved to {} (MessagePack format)", filename);
        }
        other => {
            warn!("Unknown output format '{}', falling back to JSON.", other);
            return write_summary(summary, base_filename, "json");
        }
    }
    Ok(())
}

/// Density-normalized histogram over the given inclusive edge grid. Returns
/// bin centers and densities.
fn histogram_density(values: &[f64], edges: &[f64]) -> (Vec<f64>, Vec<f64>) {
    if edges.len() < 2 {
        return (Vec::new(), Vec::new());
    }
    let mut counts = vec![0usize; edges.len() - 1];
    let lo = edges[0];
    let hi = edges[edges.len() - 1];
    let width = (hi - lo) / (edges.len() - 1) as f64;
    let mut total = 0usize;
    for &v in values {
        if v >= lo && v <= hi {
            let bin = (((v - lo) / width) as usize).min(counts.len() - 1);
            counts[bin] += 1;
            total += 1;
        }
    }
    let centers = edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    let norm = total as f64 * width;
    let density = counts
        .iter()
        .map(|&c| if norm > 0.0 { c as f64 / norm } else { 0.0 })
        .collect();
    (centers, density)
}

/// Logarithmically spaced grid between `start` and `end` (both positive).
pub fn logspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    crate::ensemble::linspace(start.log10(), end.log10(), n)
        .into_iter()
        .map(|e| 10f64.powf(e))
        .collect()
}

fn mean_std(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (Some(mean), Some(var.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoundaryPolicy, GeometryMode, LeftBoundaryPolicy};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_params() -> SimParams {
        SimParams {
            num_particles: 4,
            seed: 1,
            x_init: 0.0,
            init_shift: 0.0,
            dt: 0.1,
            sim_time: 10.0,
            num_steps: 100,
            mode: GeometryMode::Fracture,
            lower_wall: -3.0,
            upper_wall: 3.0,
            control_plane: 10.0,
            left_boundary: 0.0,
            column_left: 4.0,
            column_mid: 6.0,
            column_right: 8.0,
            jump_fracture: 0.1,
            jump_matrix: 0.01,
            jump_left_column: 0.1,
            jump_right_column: 0.1,
            fracture_diffusivity: 0.1,
            boundary_policy: BoundaryPolicy::Reflecting,
            reflected_inward: 1.0,
            reflected_outward: 1.0,
            adsorption_probability: 1.0,
            left_policy: LeftBoundaryPolicy::Open,
            reflected_left_to_right: 0.0,
            reflected_right_to_left: 0.0,
            degradation: false,
            degradation_rate: 0.05,
            stop_on_cdf: false,
            stop_fraction: 1.0,
            record_trajectories: false,
            spatial_record_time: 100.0,
            bins_space: 50,
            bins_x_interval: 10.0,
            bins_time: 10,
        }
    }

    #[test]
    fn cdf_accumulates_and_is_bounded() {
        let params = test_params();
        let mut rec = Recorder::new(&params, 4);
        rec.record_step(0, 1, 0);
        rec.record_step(1, 0, 0);
        rec.record_step(2, 2, 0);
        assert!((rec.cdf() - 0.75).abs() < 1e-15);
        let cumulative: u32 = rec.pdf_part.iter().sum();
        assert!(cumulative as usize <= 4);
    }

    #[test]
    fn arrival_times_follow_the_pdf() {
        let params = test_params();
        let mut rec = Recorder::new(&params, 4);
        rec.record_step(0, 1, 0);
        rec.record_step(4, 2, 0);
        let times = rec.arrival_times(params.dt);
        assert_eq!(times.len(), 3);
        assert!((times[0] - 0.1).abs() < 1e-15);
        assert!((times[1] - 0.5).abs() < 1e-15);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn survival_histogram_counts_exceedances() {
        let params = test_params();
        let mut rng = StdRng::seed_from_u64(1);
        let mut ens = Ensemble::new(&params, &mut rng).unwrap();
        ens.step_counts = vec![10, 20, 40, 80]; // residence times 1, 2, 4, 8
        let rec = Recorder::new(&params, 4);
        let hist = rec.survival_histogram(&ens, params.dt, vec![0.5, 3.0, 9.0]);
        assert_eq!(hist.live_counts, vec![4, 2, 0]);
    }

    #[test]
    fn spatial_capture_happens_once_at_record_time() {
        let mut params = test_params();
        params.spatial_record_time = 0.25;
        let mut rng = StdRng::seed_from_u64(1);
        let ens = Ensemble::new(&params, &mut rng).unwrap();
        let mut rec = Recorder::new(&params, 4);
        rec.maybe_capture_spatial(&params, 0.1, &ens);
        assert!(rec.spatial_profile.is_none());
        rec.maybe_capture_spatial(&params, 0.2, &ens);
        assert!(rec.spatial_profile.is_some());
        let time = rec.spatial_profile.as_ref().unwrap().time;
        rec.maybe_capture_spatial(&params, 0.2, &ens);
        assert_eq!(rec.spatial_profile.as_ref().unwrap().time, time);
    }

    #[test]
    fn logspace_is_monotone_and_spans_range() {
        let grid = logspace(0.1, 1000.0, 5);
        assert_eq!(grid.len(), 5);
        assert!((grid[0] - 0.1).abs() < 1e-12);
        assert!((grid[4] - 1000.0).abs() < 1e-9);
        assert!(grid.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn histogram_density_integrates_to_one() {
        let values: Vec<f64> = (0..1000).map(|i| i as f64 / 100.0 - 5.0).collect();
        let edges = crate::ensemble::linspace(-5.0, 5.0, 21);
        let (_, density) = histogram_density(&values, &edges);
        let width = 0.5;
        let integral: f64 = density.iter().map(|d| d * width).sum();
        assert!((integral - 1.0).abs() < 1e-12);
    }
}
