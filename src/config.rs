//! # Unified Application Configuration
//!
//! This module provides a centralized configuration system that consolidates
//! all binarization settings into a single, structured configuration object.
//! Settings come from defaults, an optional JSON file named by
//! `BINARIZATION_CONFIG`, and environment variables, in that order of
//! precedence from lowest to highest. Command line flags are applied on top
//! by the binary.

use crate::errors::{error_logging, AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::preprocessing::{MedianWindowParams, StatisticsSource, ThresholdMethod, ThresholdParams};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Processing pipeline selected on the command line or via `BINARIZATION_METHOD`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMethod {
    #[default]
    Sauvola,
    Nick,
    Global,
    Median,
    /// Sauvola, Nick and global in one run
    All,
}

impl ProcessingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMethod::Sauvola => "sauvola",
            ProcessingMethod::Nick => "nick",
            ProcessingMethod::Global => "global",
            ProcessingMethod::Median => "median",
            ProcessingMethod::All => "all",
        }
    }
}

impl std::fmt::Display for ProcessingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sauvola" => Ok(ProcessingMethod::Sauvola),
            "nick" => Ok(ProcessingMethod::Nick),
            "global" => Ok(ProcessingMethod::Global),
            "median" => Ok(ProcessingMethod::Median),
            "all" => Ok(ProcessingMethod::All),
            other => Err(format!(
                "Unknown method '{}'. Expected one of: sauvola, nick, global, median, all",
                other
            )),
        }
    }
}

/// Thresholding configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Pipeline to run
    pub method: ProcessingMethod,
    /// Odd local window side length
    pub window_size: u32,
    /// Sensitivity override; the method default applies when unset
    pub k: Option<f64>,
    /// Sauvola dynamic range of the standard deviation
    pub r: f64,
    /// Local statistics engine
    pub statistics: StatisticsSource,
    /// Fixed threshold for the global method
    pub global_threshold: u8,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            method: ProcessingMethod::default(),
            window_size: ThresholdParams::DEFAULT_WINDOW_SIZE,
            k: None,
            r: ThresholdParams::DEFAULT_R,
            statistics: StatisticsSource::default(),
            global_threshold: 127,
        }
    }
}

impl ThresholdConfig {
    /// Builds the kernel parameters for `method`.
    pub fn params_for(&self, method: ThresholdMethod) -> ThresholdParams {
        let base = match method {
            ThresholdMethod::Sauvola => ThresholdParams::sauvola(self.window_size),
            ThresholdMethod::Nick => ThresholdParams::nick(self.window_size),
        };
        let base = base.with_r(self.r);
        match self.k {
            Some(k) => base.with_k(k),
            None => base,
        }
    }

    /// Validate thresholding configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.window_size < ThresholdParams::MIN_WINDOW_SIZE || self.window_size % 2 == 0 {
            return Err(AppError::Config(format!(
                "Window size must be an odd number >= {}, got {}",
                ThresholdParams::MIN_WINDOW_SIZE,
                self.window_size
            )));
        }

        if let Some(k) = self.k {
            if !k.is_finite() {
                return Err(AppError::Config(format!("k must be a finite number, got {}", k)));
            }
        }

        if !self.r.is_finite() || self.r <= 0.0 {
            return Err(AppError::Config(format!(
                "R must be a positive number, got {}",
                self.r
            )));
        }

        Ok(())
    }
}

/// Adaptive median filter configuration
///
/// Unset bounds are taken from the noise/edge estimator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MedianConfig {
    pub min_window: Option<u32>,
    pub max_window: Option<u32>,
}

impl MedianConfig {
    /// Window bounds from the configuration, calling `estimate` only when a
    /// bound is missing.
    pub fn resolve<F>(&self, estimate: F) -> AppResult<MedianWindowParams>
    where
        F: FnOnce() -> MedianWindowParams,
    {
        let (min_size, max_size) = match (self.min_window, self.max_window) {
            (Some(min), Some(max)) => (min, max),
            (min, max) => {
                let estimated = estimate();
                (
                    min.unwrap_or(estimated.min_size),
                    max.unwrap_or(estimated.max_size),
                )
            }
        };
        MedianWindowParams::new(min_size, max_size).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Validate median filter configuration
    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [("min", self.min_window), ("max", self.max_window)] {
            if let Some(size) = value {
                if size == 0 || size % 2 == 0 {
                    return Err(AppError::Config(format!(
                        "Median {} window must be a positive odd number, got {}",
                        name, size
                    )));
                }
            }
        }

        if let (Some(min), Some(max)) = (self.min_window, self.max_window) {
            if min > max {
                return Err(AppError::Config(format!(
                    "Median min window {} cannot be greater than max window {}",
                    min, max
                )));
            }
        }

        Ok(())
    }
}

/// Output and input file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for generated files when no explicit output path is given
    pub results_dir: PathBuf,
    /// Maximum accepted input file size in bytes
    pub max_file_size: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("Results"),
            max_file_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

impl OutputConfig {
    /// Validate output configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.results_dir.as_os_str().is_empty() {
            return Err(AppError::Config("Results directory cannot be empty".to_string()));
        }

        if self.max_file_size == 0 {
            return Err(AppError::Config("Max file size cannot be 0".to_string()));
        }

        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Thresholding configuration
    pub threshold: ThresholdConfig,
    /// Median filter configuration
    pub median: MedianConfig,
    /// Output configuration
    pub output: OutputConfig,
    /// Observability configuration
    #[serde(skip)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables, starting from the JSON
    /// file named by `BINARIZATION_CONFIG` when it is set
    pub fn from_env() -> AppResult<Self> {
        let base = match env::var("BINARIZATION_CONFIG") {
            Ok(path) => Self::from_json_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        let mut config = base.with_overrides(|key| env::var(key).ok())?;
        config.observability = ObservabilityConfig::from_env();
        Ok(config)
    }

    /// Load configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            AppError::Config(format!(
                "Failed to parse configuration file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies variables resolved by `lookup` on top of `self`
    pub fn with_overrides<F>(mut self, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(method) = parse_var(&lookup, "BINARIZATION_METHOD")? {
            self.threshold.method = method;
        }
        if let Some(window_size) = parse_var(&lookup, "BINARIZATION_WINDOW_SIZE")? {
            self.threshold.window_size = window_size;
        }
        if let Some(k) = parse_var(&lookup, "BINARIZATION_K")? {
            self.threshold.k = Some(k);
        }
        if let Some(r) = parse_var(&lookup, "BINARIZATION_R")? {
            self.threshold.r = r;
        }
        if let Some(statistics) = parse_var(&lookup, "BINARIZATION_STATISTICS")? {
            self.threshold.statistics = statistics;
        }
        if let Some(threshold) = parse_var(&lookup, "GLOBAL_THRESHOLD")? {
            self.threshold.global_threshold = threshold;
        }
        if let Some(min_window) = parse_var(&lookup, "MEDIAN_MIN_WINDOW")? {
            self.median.min_window = Some(min_window);
        }
        if let Some(max_window) = parse_var(&lookup, "MEDIAN_MAX_WINDOW")? {
            self.median.max_window = Some(max_window);
        }
        if let Some(results_dir) = lookup("RESULTS_DIR") {
            self.output.results_dir = PathBuf::from(results_dir);
        }
        if let Some(max_file_size) = parse_var(&lookup, "MAX_FILE_SIZE")? {
            self.output.max_file_size = max_file_size;
        }

        Ok(self)
    }

    /// Validate all configuration sections
    ///
    /// The first failing section is logged under its config key.
    pub fn validate(&self) -> AppResult<()> {
        let sections = [
            ("threshold", self.threshold.validate()),
            ("median", self.median.validate()),
            ("output", self.output.validate()),
            (
                "observability",
                self.observability.validate().map_err(AppError::Config),
            ),
        ];
        for (section, result) in sections {
            if let Err(e) = result {
                error_logging::log_config_error(&e, section, "validate");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: method={}, window_size={}, k={}, R={}, statistics={}, global_threshold={}, median_window={:?}..{:?}, results_dir={}",
            self.threshold.method,
            self.threshold.window_size,
            self.threshold
                .k
                .map_or_else(|| "default".to_string(), |k| k.to_string()),
            self.threshold.r,
            self.threshold.statistics,
            self.threshold.global_threshold,
            self.median.min_window,
            self.median.max_window,
            self.output.results_dir.display()
        )
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{} has an invalid value: '{}'", key, raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold.method, ProcessingMethod::Sauvola);
        assert_eq!(config.threshold.window_size, 15);
        assert_eq!(config.threshold.global_threshold, 127);
    }

    #[test]
    fn test_threshold_config_validation() {
        let mut config = ThresholdConfig::default();
        assert!(config.validate().is_ok());

        // Invalid: even window
        config.window_size = 16;
        assert!(config.validate().is_err());

        // Invalid: window below minimum
        config.window_size = 1;
        assert!(config.validate().is_err());
        config.window_size = 15;

        // Invalid: non-finite k
        config.k = Some(f64::NAN);
        assert!(config.validate().is_err());
        config.k = Some(0.3);

        // Invalid: R <= 0
        config.r = 0.0;
        assert!(config.validate().is_err());
        config.r = 128.0;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_params_for_uses_method_defaults() {
        let config = ThresholdConfig::default();
        assert_eq!(config.params_for(ThresholdMethod::Sauvola).k, 0.2);
        assert_eq!(config.params_for(ThresholdMethod::Nick).k, -0.2);

        let config = ThresholdConfig {
            k: Some(0.5),
            window_size: 25,
            ..ThresholdConfig::default()
        };
        let params = config.params_for(ThresholdMethod::Nick);
        assert_eq!(params.k, 0.5);
        assert_eq!(params.window_size, 25);
    }

    #[test]
    fn test_median_config_validation() {
        let mut config = MedianConfig::default();
        assert!(config.validate().is_ok());

        config.min_window = Some(4);
        assert!(config.validate().is_err());

        config.min_window = Some(9);
        config.max_window = Some(5);
        assert!(config.validate().is_err());

        config.max_window = Some(11);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_median_resolve_overlays_estimate() {
        let estimated = MedianWindowParams::new(3, 11).unwrap();
        let config = MedianConfig {
            min_window: None,
            max_window: Some(15),
        };
        assert_eq!(
            config.resolve(|| estimated).unwrap(),
            MedianWindowParams::new(3, 15).unwrap()
        );

        let config = MedianConfig {
            min_window: Some(13),
            max_window: None,
        };
        assert!(config.resolve(|| estimated).is_err());

        // Fully configured bounds never run the estimator
        let config = MedianConfig {
            min_window: Some(5),
            max_window: Some(9),
        };
        let window = config
            .resolve(|| panic!("estimator should not run"))
            .unwrap();
        assert_eq!(window, MedianWindowParams::new(5, 9).unwrap());
    }

    #[test]
    fn test_output_config_validation() {
        let mut config = OutputConfig::default();
        assert!(config.validate().is_ok());

        config.max_file_size = 0;
        assert!(config.validate().is_err());
        config.max_file_size = 1024;

        config.results_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_applied() {
        let lookup = lookup_from(&[
            ("BINARIZATION_METHOD", "nick"),
            ("BINARIZATION_WINDOW_SIZE", "31"),
            ("BINARIZATION_K", "-0.1"),
            ("BINARIZATION_STATISTICS", "naive"),
            ("GLOBAL_THRESHOLD", "100"),
            ("MEDIAN_MAX_WINDOW", "9"),
            ("RESULTS_DIR", "/tmp/out"),
        ]);
        let config = AppConfig::default().with_overrides(lookup).unwrap();
        assert_eq!(config.threshold.method, ProcessingMethod::Nick);
        assert_eq!(config.threshold.window_size, 31);
        assert_eq!(config.threshold.k, Some(-0.1));
        assert_eq!(config.threshold.statistics, StatisticsSource::Naive);
        assert_eq!(config.threshold.global_threshold, 100);
        assert_eq!(config.median.max_window, Some(9));
        assert_eq!(config.median.min_window, None);
        assert_eq!(config.output.results_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let lookup = lookup_from(&[("GLOBAL_THRESHOLD", "300")]);
        let result = AppConfig::default().with_overrides(lookup);
        assert!(matches!(result, Err(AppError::Config(_))));

        let lookup = lookup_from(&[("BINARIZATION_METHOD", "otsu")]);
        assert!(AppConfig::default().with_overrides(lookup).is_err());
    }

    #[test]
    fn test_json_partial_sections() {
        let config: AppConfig =
            serde_json::from_str(r#"{"threshold": {"method": "all", "window_size": 21}}"#).unwrap();
        assert_eq!(config.threshold.method, ProcessingMethod::All);
        assert_eq!(config.threshold.window_size, 21);
        assert_eq!(config.threshold.r, 128.0);
        assert_eq!(config.output.results_dir, PathBuf::from("Results"));
    }

    #[test]
    fn test_processing_method_parsing() {
        assert_eq!("ALL".parse::<ProcessingMethod>(), Ok(ProcessingMethod::All));
        assert_eq!(" median ".parse::<ProcessingMethod>(), Ok(ProcessingMethod::Median));
        assert!("otsu".parse::<ProcessingMethod>().is_err());
        assert_eq!(ProcessingMethod::Global.to_string(), "global");
    }
}
