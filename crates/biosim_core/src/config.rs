//! Run configuration read from a TOML file.
//!
//! Every section is optional and every field falls back to the model's
//! default; unknown keys are rejected so that typos do not go unnoticed.
//!
//! ```toml
//! [integrator]
//! rtol = 1e-9
//! method = { kind = "rk4", step = 0.01 }
//!
//! [sirs]
//! beta = 0.5
//! delta = 0.0
//! ```

use crate::error::{Error, Result};
use crate::fit::FitSettings;
use crate::integrate::IntegratorSettings;
use crate::models::{Binding, EnzymeAssay, GutBlood, OdeModel, OralDose, Seirs, Sirs};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub integrator: IntegratorSettings,
    pub gut_blood: GutBlood,
    pub oral_dose: OralDose,
    pub binding: Binding,
    pub sirs: Sirs,
    pub seirs: Seirs,
    pub enzyme: EnzymeAssay,
    pub fit: FitSettings,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text).map_err(|e| match e {
            Error::Config(message) => Error::Config(format!("{}: {message}", path.display())),
            other => other,
        })?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a configuration document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings and model parameters. The enzyme data set is
    /// checked when it is analyzed.
    pub fn validate(&self) -> Result<()> {
        let sections: [(&str, Result<()>); 7] = [
            ("integrator", self.integrator.validate()),
            ("fit", self.fit.validate()),
            ("gut_blood", self.gut_blood.validate()),
            ("oral_dose", self.oral_dose.validate()),
            ("binding", self.binding.validate()),
            ("sirs", self.sirs.validate()),
            ("seirs", self.seirs.validate()),
        ];
        for (name, result) in sections {
            result.map_err(|e| Error::Config(format!("[{name}] {e}")))?;
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::error::Error;
    use crate::integrate::Method;

    fn assert_config_err_contains(text: &str, needle: &str) {
        match Config::from_toml_str(text) {
            Err(Error::Config(message)) => {
                assert!(message.contains(needle), "expected '{needle}' in '{message}'")
            }
            other => panic!("expected a configuration error, got {other:?}"),
        }
    }

    #[test]
    fn empty_document_is_all_defaults() {
        assert_eq!(Config::from_toml_str("").expect("parse"), Config::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [gut_blood]
            half_life = 8.0

            [sirs]
            beta = 0.5
            delta = 0.0

            [integrator]
            method = { kind = "rk4", step = 0.05 }
            "#,
        )
        .expect("parse");
        assert_eq!(config.gut_blood.half_life, 8.0);
        assert_eq!(config.gut_blood.dose, 1000.0);
        assert_eq!(config.sirs.beta, 0.5);
        assert_eq!(config.sirs.gamma, 0.1);
        assert_eq!(config.integrator.method, Method::Rk4 { step: 0.05 });
        assert_eq!(config.integrator.rtol, 1e-8);
    }

    #[test]
    fn enzyme_data_can_be_replaced() {
        let config = Config::from_toml_str(
            r#"
            [enzyme]
            substrate = [0.1, 0.2, 0.4]
            absorbance_rate = [0.01, 0.02, 0.03]
            initial_km = 0.3
            "#,
        )
        .expect("parse");
        assert_eq!(config.enzyme.substrate.len(), 3);
        assert_eq!(config.enzyme.initial_km, Some(0.3));
        assert_eq!(config.enzyme.calibration_absorbance.len(), 6);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert_config_err_contains("[binding]\nkoff_rate = 0.1\n", "koff_rate");
        assert_config_err_contains("[plotting]\nenabled = true\n", "plotting");
    }

    #[test]
    fn invalid_values_name_their_section() {
        assert_config_err_contains("[binding]\nreceptor_total = -1.0\n", "[binding]");
        assert_config_err_contains("[fit]\nconfidence_level = 1.5\n", "[fit]");
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = Config::default();
        config.seirs.incubation_rate = 0.5;
        let text = config.to_toml_string().expect("serialize");
        assert_eq!(Config::from_toml_str(&text).expect("parse"), config);
    }

    #[test]
    fn load_names_the_file_once() {
        let path = std::env::temp_dir().join(format!("biosim-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[sirs]\nbeta = -0.3\n").expect("write config");
        let err = Config::load(&path).expect_err("negative beta");
        std::fs::remove_file(&path).ok();
        let message = err.to_string();
        assert!(message.contains(&path.display().to_string()), "got {message}");
        assert!(message.contains("[sirs]"), "got {message}");
        assert_eq!(message.matches("configuration error").count(), 1, "got {message}");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/nonexistent/biosim.toml").expect_err("missing file");
        assert!(err.to_string().contains("cannot read"), "got {err}");
    }
}
