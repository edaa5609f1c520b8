//! Plain-text summaries printed after each run.

use std::fmt::Write;

use biosim_core::fit::ProportionalFit;
use biosim_core::trajectory::Sample;
use biosim_core::{FitResult, Trajectory};

/// Peak, final value and settling time of every component.
pub fn trajectory_summary(trajectory: &Trajectory, steady_threshold: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:>12} {:>14} {:>14} {:>14}",
        "component", "peak time", "peak value", "final value", "settled at"
    );
    let last = trajectory.final_state().unwrap_or(&[]);
    for (idx, name) in trajectory.names().iter().enumerate() {
        let peak = trajectory.peak(idx);
        let settled = trajectory
            .steady_state_time(idx, steady_threshold)
            .map_or_else(|| "not settled".to_string(), |t| format!("{t:.2}"));
        let _ = writeln!(
            out,
            "{:<12} {:>12} {:>14} {:>14.6} {:>14}",
            name,
            peak.map_or("-".to_string(), |p| format!("{:.2}", p.time)),
            peak.map_or("-".to_string(), |p| format!("{:.6}", p.value)),
            last.get(idx).copied().unwrap_or(f64::NAN),
            settled,
        );
    }
    out
}

pub fn maxima_line(name: &str, maxima: &[Sample]) -> String {
    match maxima {
        [] => format!("{name}: no interior maximum"),
        [only] => format!("{name}: single maximum {:.6} at t = {:.2}", only.value, only.time),
        many => {
            let times: Vec<String> = many.iter().map(|m| format!("{:.2}", m.time)).collect();
            format!("{name}: {} maxima at t = {}", many.len(), times.join(", "))
        }
    }
}

pub fn calibration_summary(fit: &ProportionalFit) -> String {
    format!(
        "calibration slope {:.4} (se {:.2e}, {:.0}% CI [{:.4}, {:.4}], r² {})",
        fit.slope,
        fit.std_error,
        100.0 * fit.confidence_level,
        fit.lower,
        fit.upper,
        fit.r_squared.map_or("-".to_string(), |r| format!("{r:.5}")),
    )
}

pub fn fit_summary(result: &FitResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<8} {:>14} {:>14} {:>30}",
        "param",
        "estimate",
        "std error",
        format!("{:.0}% interval", 100.0 * result.confidence_level)
    );
    for p in &result.parameters {
        let _ = writeln!(
            out,
            "{:<8} {:>14.6e} {:>14.3e} {:>30}",
            p.name,
            p.value,
            p.std_error,
            format!("[{:.6e}, {:.6e}]", p.lower, p.upper)
        );
    }
    let _ = writeln!(
        out,
        "rmse {:.3e}, r² {}, {} degrees of freedom, {} iterations",
        result.rmse,
        result.r_squared.map_or("-".to_string(), |r| format!("{r:.5}")),
        result.degrees_of_freedom,
        result.iterations
    );
    out
}

#[cfg(test)]
mod tests {
    use super::{maxima_line, trajectory_summary};
    use biosim_core::trajectory::Sample;
    use biosim_core::Trajectory;

    #[test]
    fn maxima_line_distinguishes_counts() {
        assert_eq!(maxima_line("blood", &[]), "blood: no interior maximum");
        let one = Sample {
            time: 2.5,
            value: 1.0,
        };
        assert!(maxima_line("blood", &[one]).starts_with("blood: single maximum"));
        assert!(maxima_line("infected", &[one, one]).contains("2 maxima"));
    }

    #[test]
    fn summary_lists_every_component() {
        let trajectory = Trajectory::new(
            vec!["free".into(), "bound".into()],
            vec![0.0, 1.0, 2.0],
            vec![vec![2.0, 0.0], vec![1.0, 1.0], vec![1.0, 1.0]],
        )
        .expect("trajectory");
        let text = trajectory_summary(&trajectory, 0.1);
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("free") && text.contains("bound"));
    }
}
