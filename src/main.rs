use anyhow::Result;
use log::{error, info, trace};
use std::time::Instant;

use fracture_rw::config::SimulationConfig;
use fracture_rw::recorder::{write_final_positions, write_summary};
use fracture_rw::simulation::Simulation;

fn main() -> Result<()> {
    env_logger::init();

    info!("Starting fracture random-walk particle tracker...");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = SimulationConfig::load(&config_path)?;

    info!("Using {} Rayon threads.", rayon::current_num_threads());

    let mut sim = Simulation::new(config)?;
    let params = sim.params().clone();
    info!(
        "Initialized {} particles, {} steps of dt = {} ({} geometry, {:?} walls).",
        sim.ensemble().len(),
        params.num_steps,
        params.dt,
        match params.mode {
            fracture_rw::GeometryMode::Fracture => "fracture/matrix",
            fracture_rw::GeometryMode::Columns => "two-column verification",
        },
        params.boundary_policy,
    );

    let start_time = Instant::now();
    let mut previous_print_time = start_time;
    let print_interval_secs = 5.0;

    let stop_reason = loop {
        if let Some(reason) = sim.check_termination() {
            break reason;
        }
        let step_start = Instant::now();
        if let Err(e) = sim.step() {
            error!("Simulation step {} failed: {}", sim.steps_taken() + 1, e);
            anyhow::bail!("Simulation aborted.");
        }
        let step_duration = step_start.elapsed();

        let now = Instant::now();
        if now.duration_since(previous_print_time).as_secs_f64() >= print_interval_secs {
            info!(
                "Step [{}/{}] (t = {:.2}) | Active: {} | Escaped: {} | Step time: {:6.2} ms | Elapsed: {:.2} s",
                sim.steps_taken(),
                params.num_steps,
                sim.elapsed_time(),
                sim.ensemble().active_count(),
                sim.ensemble().escaped_count(),
                step_duration.as_secs_f64() * 1000.0,
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = now;
        } else {
            trace!(
                "Step [{}/{}] completed in {:.2} ms",
                sim.steps_taken(),
                params.num_steps,
                step_duration.as_secs_f64() * 1000.0
            );
        }
    };

    let total_duration = start_time.elapsed();
    info!(
        "Run finished in {:.3} s after {} steps: {}",
        total_duration.as_secs_f64(),
        sim.steps_taken(),
        stop_reason
    );
    info!(
        "Escaped: {} | Absorbed: {} | Breakthrough CDF: {:.4}",
        sim.ensemble().escaped_count(),
        sim.ensemble().absorbed_count(),
        sim.recorder().cdf()
    );

    let output = sim.config().output.clone();

    if output.save_summary {
        let summary = sim.summary(stop_reason, total_duration.as_secs_f64());
        if let Some(mean) = summary.mean_arrival_time {
            info!(
                "<t> = {:.4}, sigma_t = {:.4}",
                mean,
                summary.std_arrival_time.unwrap_or(0.0)
            );
        }
        if summary.impacts > 0 {
            info!(
                "Adsorbed/impacts ratio: {:.4}",
                summary.absorbed as f64 / summary.impacts as f64
            );
        }
        let format = output.format.as_deref().unwrap_or("json");
        if let Err(e) = write_summary(&summary, &output.base_filename, format) {
            error!("Error writing run summary: {}", e);
        }
    } else {
        info!("Skipping run summary as per config.");
    }

    if output.save_breakthrough {
        let filename = format!("{}_breakthrough.txt", output.base_filename);
        if let Err(e) = sim.recorder().write_breakthrough_table(&filename, params.dt) {
            error!("Error writing breakthrough table: {}", e);
        }
    }

    if output.save_positions {
        let filename = format!("{}_final_positions.csv", output.base_filename);
        if let Err(e) = write_final_positions(&filename, &sim.ensemble().positions()) {
            error!("Error writing final positions: {}", e);
        }
    } else {
        info!("Skipping final positions as per config.");
    }

    info!("Simulation complete.");
    Ok(())
}
