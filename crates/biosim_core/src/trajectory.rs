use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// States sampled at a strictly increasing sequence of output times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    names: Vec<String>,
    times: Vec<f64>,
    states: Vec<Vec<f64>>,
}

/// A single (time, value) point of one component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub value: f64,
}

impl Trajectory {
    pub fn new(names: Vec<String>, times: Vec<f64>, states: Vec<Vec<f64>>) -> Result<Self> {
        if times.len() != states.len() {
            return Err(Error::invalid(format!(
                "{} output times but {} states",
                times.len(),
                states.len()
            )));
        }
        if let Some(bad) = states.iter().position(|s| s.len() != names.len()) {
            return Err(Error::invalid(format!(
                "state {} has {} components, expected {}",
                bad,
                states[bad].len(),
                names.len()
            )));
        }
        Ok(Self {
            names,
            times,
            states,
        })
    }

    /// Replaces the component names.
    pub fn with_names<I, S>(mut self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.len() != self.names.len() {
            return Err(Error::invalid(format!(
                "expected {} component names, got {}",
                self.names.len(),
                names.len()
            )));
        }
        self.names = names;
        Ok(self)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[Vec<f64>] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64])> + '_ {
        self.times
            .iter()
            .zip(&self.states)
            .map(|(&t, s)| (t, s.as_slice()))
    }

    pub fn final_state(&self) -> Option<&[f64]> {
        self.states.last().map(Vec::as_slice)
    }

    pub fn component_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Values of one component over time.
    pub fn column(&self, index: usize) -> Option<Vec<f64>> {
        (index < self.dimension()).then(|| self.states.iter().map(|s| s[index]).collect())
    }

    pub fn column_by_name(&self, name: &str) -> Option<Vec<f64>> {
        self.component_index(name).and_then(|i| self.column(i))
    }

    /// Global maximum of a component; the earliest one on ties.
    pub fn peak(&self, index: usize) -> Option<Sample> {
        let column = self.column(index)?;
        let mut best: Option<Sample> = None;
        for (&time, &value) in self.times.iter().zip(&column) {
            if best.map_or(true, |b| value > b.value) {
                best = Some(Sample { time, value });
            }
        }
        best
    }

    /// Interior local maxima of a component. A plateau counts once, at its
    /// first sample.
    pub fn local_maxima(&self, index: usize) -> Vec<Sample> {
        let Some(column) = self.column(index) else {
            return Vec::new();
        };
        let mut maxima = Vec::new();
        let mut i = 1;
        while i + 1 < column.len() {
            if column[i] > column[i - 1] {
                let start = i;
                while i + 1 < column.len() && column[i + 1] == column[start] {
                    i += 1;
                }
                if i + 1 < column.len() && column[i + 1] < column[start] {
                    maxima.push(Sample {
                        time: self.times[start],
                        value: column[start],
                    });
                }
            }
            i += 1;
        }
        maxima
    }

    /// Earliest output time after which the component never changes by
    /// `threshold` or more between consecutive samples.
    ///
    /// Returns `None` when the last interval still changes by at least
    /// `threshold`.
    pub fn steady_state_time(&self, index: usize, threshold: f64) -> Option<f64> {
        let column = self.column(index)?;
        if column.is_empty() {
            return None;
        }
        let mut settled = column.len() - 1;
        while settled > 0 && (column[settled] - column[settled - 1]).abs() < threshold {
            settled -= 1;
        }
        if settled == column.len() - 1 && column.len() > 1 {
            return None;
        }
        Some(self.times[settled])
    }

    /// True when the component never decreases by more than `tolerance`
    /// between consecutive samples.
    pub fn is_non_decreasing(&self, index: usize, tolerance: f64) -> bool {
        self.column(index)
            .map(|c| c.windows(2).all(|w| w[1] >= w[0] - tolerance))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::{Sample, Trajectory};

    fn scalar(values: &[f64]) -> Trajectory {
        let times = (0..values.len()).map(|i| i as f64).collect();
        let states = values.iter().map(|&v| vec![v]).collect();
        Trajectory::new(vec!["x".to_string()], times, states).expect("valid trajectory")
    }

    #[test]
    fn new_rejects_mismatched_lengths() {
        let err = Trajectory::new(vec!["x".into()], vec![0.0, 1.0], vec![vec![1.0]])
            .expect_err("length mismatch");
        assert!(err.to_string().contains("2 output times"), "got {err}");

        let err = Trajectory::new(vec!["x".into()], vec![0.0], vec![vec![1.0, 2.0]])
            .expect_err("width mismatch");
        assert!(err.to_string().contains("expected 1"), "got {err}");
    }

    #[test]
    fn with_names_checks_count() {
        let t = scalar(&[1.0]);
        assert!(t.clone().with_names(["a", "b"]).is_err());
        let renamed = t.with_names(["blood"]).expect("rename");
        assert_eq!(renamed.component_index("blood"), Some(0));
        assert_eq!(renamed.column_by_name("blood"), Some(vec![1.0]));
        assert_eq!(renamed.column_by_name("gut"), None);
    }

    #[test]
    fn peak_returns_first_global_maximum() {
        let t = scalar(&[0.0, 3.0, 1.0, 3.0, 2.0]);
        assert_eq!(
            t.peak(0),
            Some(Sample {
                time: 1.0,
                value: 3.0
            })
        );
        assert_eq!(t.peak(1), None);
    }

    #[test]
    fn local_maxima_counts_plateaus_once() {
        let t = scalar(&[0.0, 2.0, 2.0, 1.0, 4.0, 0.0, 5.0]);
        let maxima = t.local_maxima(0);
        let times: Vec<f64> = maxima.iter().map(|m| m.time).collect();
        assert_eq!(times, vec![1.0, 4.0]);
    }

    #[test]
    fn monotone_curve_has_no_interior_maximum() {
        let t = scalar(&[0.0, 1.0, 1.5, 1.75, 1.875]);
        assert!(t.local_maxima(0).is_empty());
        assert!(t.is_non_decreasing(0, 0.0));
        assert!(!scalar(&[1.0, 0.5]).is_non_decreasing(0, 1e-3));
    }

    #[test]
    fn steady_state_time_finds_last_large_change() {
        let t = scalar(&[0.0, 5.0, 8.0, 8.5, 8.55, 8.56]);
        assert_eq!(t.steady_state_time(0, 0.6), Some(2.0));
        assert_eq!(t.steady_state_time(0, 0.001), None);
        assert_eq!(scalar(&[1.0]).steady_state_time(0, 0.1), Some(0.0));
    }
}
