use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named real parameters, fixed for the duration of one fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, f64>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.keys().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::ParameterSet;

    #[test]
    fn builder_and_lookup() {
        let params = ParameterSet::new().with("vmax", 0.01).with("km", 0.5);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("km"), Some(0.5));
        assert_eq!(params.get("kcat"), None);
        let names: Vec<&str> = params.names().collect();
        assert_eq!(names, vec!["km", "vmax"]);
    }
}
