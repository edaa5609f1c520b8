//! CSV and JSON export of trajectories and tables.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use biosim_core::Trajectory;
use log::info;
use serde::Serialize;

use crate::cli::ExportArgs;

/// One row per output time: `time` followed by each component.
pub fn write_trajectory_csv(path: &Path, trajectory: &Trajectory) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let header = std::iter::once("time").chain(trajectory.names().iter().map(String::as_str));
    writer.write_record(header)?;
    for (t, state) in trajectory.iter() {
        let row = std::iter::once(t).chain(state.iter().copied());
        writer.write_record(row.map(|v| v.to_string()))?;
    }
    writer.flush()?;
    info!("wrote {} rows to {}", trajectory.len(), path.display());
    Ok(())
}

/// Serializes each record as a CSV row with a header taken from its fields.
pub fn write_records_csv<R: Serialize>(path: &Path, records: &[R]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!("wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

/// Writes a trajectory to whichever outputs were requested.
pub fn export_trajectory(args: &ExportArgs, trajectory: &Trajectory) -> Result<()> {
    if let Some(path) = &args.csv {
        write_trajectory_csv(path, trajectory)?;
    }
    if let Some(path) = &args.json {
        write_json(path, trajectory)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{write_json, write_records_csv, write_trajectory_csv};
    use biosim_core::Trajectory;
    use serde::Serialize;

    fn scratch(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("biosim-{}-{name}", std::process::id()))
    }

    fn sample() -> Trajectory {
        Trajectory::new(
            vec!["gut".into(), "blood".into()],
            vec![0.0, 0.5],
            vec![vec![1000.0, 0.0], vec![637.5, 350.25]],
        )
        .expect("trajectory")
    }

    #[test]
    fn trajectory_csv_has_time_column() {
        let path = scratch("trajectory.csv");
        write_trajectory_csv(&path, &sample()).expect("write");
        let text = std::fs::read_to_string(&path).expect("read");
        std::fs::remove_file(&path).ok();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["time,gut,blood", "0,1000,0", "0.5,637.5,350.25"]);
    }

    #[test]
    fn records_csv_uses_field_names() {
        #[derive(Serialize)]
        struct Row {
            beta: f64,
            peak: f64,
        }
        let path = scratch("rows.csv");
        write_records_csv(&path, &[Row { beta: 0.3, peak: 0.25 }]).expect("write");
        let text = std::fs::read_to_string(&path).expect("read");
        std::fs::remove_file(&path).ok();
        assert_eq!(text, "beta,peak\n0.3,0.25\n");
    }

    #[test]
    fn json_round_trips_trajectory() {
        let path = scratch("trajectory.json");
        write_json(&path, &sample()).expect("write");
        let text = std::fs::read_to_string(&path).expect("read");
        std::fs::remove_file(&path).ok();
        let back: Trajectory = serde_json::from_str(&text).expect("parse");
        assert_eq!(back, sample());
    }
}
