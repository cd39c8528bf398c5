//! # Command Line Arguments
//!
//! Parsing of `<input> [threshold] [output] [--flag value ...]` into overrides
//! for [`AppConfig`]. Flags accept both `--flag value` and `--flag=value`.

use std::path::PathBuf;

use crate::config::{AppConfig, ProcessingMethod};
use crate::errors::{AppError, AppResult};
use crate::preprocessing::StatisticsSource;

pub const USAGE: &str = "\
Usage: adaptive-binarization <input.(png|jpg|ppm...)> [threshold] [output.(png|jpg|ppm...)]
       [--method sauvola|nick|global|median|all] [--window_size N] [--k F] [--R F]
       [--threshold N] [--statistics integral|naive] [--min_size N] [--max_size N]
       [--output PATH] [--results_dir DIR]

Without --output, results are written to <results_dir>/<stem>_bin_<method>.<ext>.";

/// Parsed command line
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    Run(CliArgs),
    Help,
}

/// Command line overrides; unset fields keep the configured value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    pub input: PathBuf,
    pub method: Option<ProcessingMethod>,
    pub window_size: Option<u32>,
    pub k: Option<f64>,
    pub r: Option<f64>,
    pub threshold: Option<u8>,
    pub statistics: Option<StatisticsSource>,
    pub min_size: Option<u32>,
    pub max_size: Option<u32>,
    pub output: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
}

impl CliArgs {
    /// Applies the overrides to `config`
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(method) = self.method {
            config.threshold.method = method;
        }
        if let Some(window_size) = self.window_size {
            config.threshold.window_size = window_size;
        }
        if let Some(k) = self.k {
            config.threshold.k = Some(k);
        }
        if let Some(r) = self.r {
            config.threshold.r = r;
        }
        if let Some(threshold) = self.threshold {
            config.threshold.global_threshold = threshold;
        }
        if let Some(statistics) = self.statistics {
            config.threshold.statistics = statistics;
        }
        if let Some(min_size) = self.min_size {
            config.median.min_window = Some(min_size);
        }
        if let Some(max_size) = self.max_size {
            config.median.max_window = Some(max_size);
        }
        if let Some(results_dir) = &self.results_dir {
            config.output.results_dir = results_dir.clone();
        }
    }
}

/// Parse arguments, excluding the program name
pub fn parse_args<I, S>(args: I) -> AppResult<CliCommand>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut parsed = CliArgs::default();
    let mut positionals: Vec<String> = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "-h" || arg == "--help" {
            return Ok(CliCommand::Help);
        }

        let Some(flag) = arg.strip_prefix("--") else {
            positionals.push(arg);
            continue;
        };

        let (name, inline_value) = match flag.split_once('=') {
            Some((name, value)) => (name.to_string(), Some(value.to_string())),
            None => (flag.to_string(), None),
        };
        let value = match inline_value {
            Some(value) => value,
            None => args
                .next()
                .ok_or_else(|| AppError::Validation(format!("Missing value for --{}", name)))?,
        };

        match name.as_str() {
            "method" => parsed.method = Some(parse_value(&name, &value)?),
            "window_size" | "window-size" => parsed.window_size = Some(parse_value(&name, &value)?),
            "k" => parsed.k = Some(parse_value(&name, &value)?),
            "R" | "r" => parsed.r = Some(parse_value(&name, &value)?),
            "threshold" => parsed.threshold = Some(parse_value(&name, &value)?),
            "statistics" => parsed.statistics = Some(parse_value(&name, &value)?),
            "min_size" | "min-size" => parsed.min_size = Some(parse_value(&name, &value)?),
            "max_size" | "max-size" => parsed.max_size = Some(parse_value(&name, &value)?),
            "output" => parsed.output = Some(PathBuf::from(value)),
            "results_dir" | "results-dir" => parsed.results_dir = Some(PathBuf::from(value)),
            other => {
                return Err(AppError::Validation(format!("Unknown option --{}", other)));
            }
        }
    }

    let mut positionals = positionals.into_iter();
    parsed.input = positionals
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| AppError::Validation("Missing input image path".to_string()))?;

    // Legacy form: <input> <threshold> [<output>]
    if let Some(threshold) = positionals.next() {
        if parsed.threshold.is_none() {
            parsed.threshold = Some(parse_value("threshold", &threshold)?);
        }
        if parsed.method.is_none() {
            parsed.method = Some(ProcessingMethod::Global);
        }
    }
    if let Some(output) = positionals.next() {
        if parsed.output.is_none() {
            parsed.output = Some(PathBuf::from(output));
        }
    }
    if let Some(extra) = positionals.next() {
        return Err(AppError::Validation(format!("Unexpected argument '{}'", extra)));
    }

    Ok(CliCommand::Run(parsed))
}

fn parse_value<T: std::str::FromStr>(name: &str, value: &str) -> AppResult<T> {
    value.trim().parse().map_err(|_| {
        AppError::Validation(format!("Invalid value for --{}: '{}'", name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> CliArgs {
        match parse_args(args.iter().copied()).unwrap() {
            CliCommand::Run(args) => args,
            CliCommand::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn test_input_only() {
        let args = run(&["page.png"]);
        assert_eq!(args.input, PathBuf::from("page.png"));
        assert_eq!(args.method, None);
        assert_eq!(args.output, None);
    }

    #[test]
    fn test_all_flags() {
        let args = run(&[
            "scan.jpg",
            "--method",
            "nick",
            "--window_size",
            "25",
            "--k=-0.1",
            "--R",
            "100",
            "--statistics",
            "naive",
            "--min_size",
            "3",
            "--max_size=9",
            "--output",
            "out.ppm",
            "--results_dir",
            "res",
        ]);
        assert_eq!(args.method, Some(ProcessingMethod::Nick));
        assert_eq!(args.window_size, Some(25));
        assert_eq!(args.k, Some(-0.1));
        assert_eq!(args.r, Some(100.0));
        assert_eq!(args.statistics, Some(StatisticsSource::Naive));
        assert_eq!(args.min_size, Some(3));
        assert_eq!(args.max_size, Some(9));
        assert_eq!(args.output, Some(PathBuf::from("out.ppm")));
        assert_eq!(args.results_dir, Some(PathBuf::from("res")));
    }

    #[test]
    fn test_negative_k_as_separate_value() {
        let args = run(&["a.png", "--k", "-0.2"]);
        assert_eq!(args.k, Some(-0.2));
    }

    #[test]
    fn test_legacy_positional_threshold() {
        let args = run(&["in.png", "140", "out.png"]);
        assert_eq!(args.threshold, Some(140));
        assert_eq!(args.method, Some(ProcessingMethod::Global));
        assert_eq!(args.output, Some(PathBuf::from("out.png")));
    }

    #[test]
    fn test_errors() {
        assert!(parse_args(Vec::<String>::new()).is_err());
        assert!(parse_args(["a.png", "--window_size"]).is_err());
        assert!(parse_args(["a.png", "--window_size", "big"]).is_err());
        assert!(parse_args(["a.png", "--method", "otsu"]).is_err());
        assert!(parse_args(["a.png", "--bogus", "1"]).is_err());
        assert!(parse_args(["a.png", "300"]).is_err());
        assert!(parse_args(["a.png", "1", "b.png", "c.png"]).is_err());
    }

    #[test]
    fn test_help() {
        assert_eq!(parse_args(["--help"]).unwrap(), CliCommand::Help);
        assert_eq!(parse_args(["a.png", "-h"]).unwrap(), CliCommand::Help);
    }

    #[test]
    fn test_apply_to_config() {
        let mut config = AppConfig::default();
        let args = run(&["a.png", "--method", "median", "--max_size", "11", "--threshold", "90"]);
        args.apply_to(&mut config);
        assert_eq!(config.threshold.method, ProcessingMethod::Median);
        assert_eq!(config.median.max_window, Some(11));
        assert_eq!(config.median.min_window, None);
        assert_eq!(config.threshold.global_threshold, 90);
        assert_eq!(config.threshold.window_size, 15);
    }
}
