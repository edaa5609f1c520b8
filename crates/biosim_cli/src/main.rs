mod cli;
mod export;
mod report;

use anyhow::{Context, Result};
use biosim_core::config::Config;
use biosim_core::models::{EnzymeAssay, OdeModel, Sirs};
use biosim_core::{IntegratorSettings, Trajectory};
use clap::Parser;
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::cli::{Cli, Command, ExportArgs, OutputArgs, SweepArgs};

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::GutBlood(args) => {
            let trajectory = simulate("gut-blood", &config.gut_blood, &config.integrator)?;
            let blood = trajectory.local_maxima(1);
            println!("{}", report::maxima_line("blood", &blood));
            finish(&trajectory, &args)
        }
        Command::OralDose(args) => {
            let model = config.oral_dose;
            let curve = model.curve().context("oral-dose curve")?;
            println!(
                "peak concentration {:.6} at t = {:.4} (ke = {:.5}, ka = {:.5})",
                model.peak_concentration(),
                model.peak_time(),
                model.elimination_rate(),
                model.absorption_rate
            );
            finish(&curve, &args)
        }
        Command::Binding(args) => {
            let model = config.binding;
            let trajectory = simulate("binding", &model, &config.integrator)?;
            println!("equilibrium bound {:.3}", model.equilibrium_bound());
            finish(&trajectory, &args)
        }
        Command::Sirs(args) => {
            let model = config.sirs;
            let trajectory = simulate("sirs", &model, &config.integrator)?;
            println!("R0 = {:.3}", model.r0());
            println!("{}", report::maxima_line("infected", &trajectory.local_maxima(1)));
            finish(&trajectory, &args)
        }
        Command::Seirs(args) => {
            let trajectory = simulate("seirs", &config.seirs, &config.integrator)?;
            println!("{}", report::maxima_line("infected", &trajectory.local_maxima(2)));
            finish(&trajectory, &args)
        }
        Command::Enzyme(args) => run_enzyme(&config, &args),
        Command::Sweep(args) => run_sweep(&config, &args),
    }
}

fn simulate<M: OdeModel>(
    label: &str,
    model: &M,
    settings: &IntegratorSettings,
) -> Result<Trajectory> {
    let trajectory = model
        .simulate(settings)
        .with_context(|| format!("{label} simulation failed"))?;
    info!("{label}: {} samples", trajectory.len());
    Ok(trajectory)
}

fn finish(trajectory: &Trajectory, args: &OutputArgs) -> Result<()> {
    print!("{}", report::trajectory_summary(trajectory, args.steady_threshold));
    export::export_trajectory(&args.export, trajectory)
}

#[derive(Debug, Serialize)]
struct VelocityRow {
    substrate: f64,
    absorbance_rate: f64,
    velocity: f64,
    fitted: f64,
}

fn run_enzyme(config: &Config, args: &ExportArgs) -> Result<()> {
    let assay: &EnzymeAssay = &config.enzyme;
    let analysis = assay.analyze(&config.fit).context("enzyme analysis failed")?;
    println!("{}", report::calibration_summary(&analysis.calibration));
    print!("{}", report::fit_summary(&analysis.fit));

    if let Some(path) = &args.csv {
        let rows: Vec<VelocityRow> = assay
            .substrate
            .iter()
            .zip(&assay.absorbance_rate)
            .zip(&analysis.velocities)
            .zip(&analysis.fit.residuals)
            .map(|(((&s, &a), &v), &r)| VelocityRow {
                substrate: s,
                absorbance_rate: a,
                velocity: v,
                fitted: v - r,
            })
            .collect();
        export::write_records_csv(path, &rows)?;
    }
    if let Some(path) = &args.json {
        export::write_json(path, &analysis)?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SweepRow {
    beta: f64,
    r0: f64,
    peak_time: f64,
    peak_infected: f64,
    final_infected: f64,
}

fn run_sweep(config: &Config, args: &SweepArgs) -> Result<()> {
    let base = config.sirs;
    let settings = config.integrator;
    // Each run is independent; results come back in the order given.
    let rows: Vec<SweepRow> = args
        .beta
        .par_iter()
        .map(|&beta| sweep_point(Sirs { beta, ..base }, &settings))
        .collect::<Result<_>>()?;

    println!(
        "{:>8} {:>8} {:>10} {:>14} {:>14}",
        "beta", "R0", "peak t", "peak I", "final I"
    );
    for row in &rows {
        if row.r0 <= 1.0 {
            warn!("beta = {} gives R0 = {:.3}; no outbreak", row.beta, row.r0);
        }
        println!(
            "{:>8.4} {:>8.3} {:>10.2} {:>14.6} {:>14.6}",
            row.beta, row.r0, row.peak_time, row.peak_infected, row.final_infected
        );
    }

    if let Some(path) = &args.export.csv {
        export::write_records_csv(path, &rows)?;
    }
    if let Some(path) = &args.export.json {
        export::write_json(path, &rows)?;
    }
    Ok(())
}

fn sweep_point(model: Sirs, settings: &IntegratorSettings) -> Result<SweepRow> {
    let trajectory = model
        .simulate(settings)
        .with_context(|| format!("sirs simulation failed for beta = {}", model.beta))?;
    let peak = trajectory.peak(1).context("empty trajectory")?;
    let final_infected = trajectory.final_state().map_or(f64::NAN, |s| s[1]);
    Ok(SweepRow {
        beta: model.beta,
        r0: model.r0(),
        peak_time: peak.time,
        peak_infected: peak.value,
        final_infected,
    })
}

#[cfg(test)]
mod tests {
    use super::sweep_point;
    use biosim_core::models::Sirs;
    use biosim_core::IntegratorSettings;

    #[test]
    fn faster_transmission_peaks_earlier_and_higher() {
        let settings = IntegratorSettings::default();
        let base = Sirs::default();
        let slow = sweep_point(Sirs { beta: 0.3, ..base }, &settings).expect("slow");
        let fast = sweep_point(Sirs { beta: 0.6, ..base }, &settings).expect("fast");
        assert!(fast.peak_time < slow.peak_time);
        assert!(fast.peak_infected > slow.peak_infected);
    }

    #[test]
    fn invalid_beta_is_reported_with_context() {
        let err = sweep_point(
            Sirs {
                beta: -1.0,
                ..Sirs::default()
            },
            &IntegratorSettings::default(),
        )
        .expect_err("negative beta");
        assert!(format!("{err:#}").contains("beta = -1"), "got {err:#}");
    }
}
