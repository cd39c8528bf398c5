//! # Processing Pipeline
//!
//! Runs the configured method on one input file: load, convert to grayscale,
//! binarize or denoise, and write each result.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::info;

use crate::config::{AppConfig, ProcessingMethod};
use crate::errors::{error_logging, AppResult};
use crate::image_io::{load_image, make_output_path, save_gray};
use crate::observability::preprocessing_span;
use crate::preprocessing::{
    apply_adaptive_median_filter_cancellable, apply_adaptive_threshold_cancellable,
    apply_global_threshold, estimate_window_params, CancellationToken, GrayscaleImage,
    ThresholdMethod,
};

/// One written result
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Method name, also used as the file name suffix
    pub method: &'static str,
    pub path: PathBuf,
    /// Fraction of white pixels for binarization outputs
    pub white_ratio: Option<f32>,
    pub processing_time_ms: u32,
}

/// A single processing step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Adaptive(ThresholdMethod),
    Global,
    Median,
}

impl Stage {
    fn expand(method: ProcessingMethod) -> &'static [Stage] {
        match method {
            ProcessingMethod::Sauvola => &[Stage::Adaptive(ThresholdMethod::Sauvola)],
            ProcessingMethod::Nick => &[Stage::Adaptive(ThresholdMethod::Nick)],
            ProcessingMethod::Global => &[Stage::Global],
            ProcessingMethod::Median => &[Stage::Median],
            ProcessingMethod::All => &[
                Stage::Adaptive(ThresholdMethod::Sauvola),
                Stage::Adaptive(ThresholdMethod::Nick),
                Stage::Global,
            ],
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Stage::Adaptive(method) => method.as_str(),
            Stage::Global => "global",
            Stage::Median => "median",
        }
    }
}

/// Load `input`, run the configured method(s) and write the results
///
/// `output` names the result file for a single method. With
/// [`ProcessingMethod::All`] it is used as a template and each method's name
/// is appended to its stem.
pub fn run(
    config: &AppConfig,
    input: &Path,
    output: Option<&Path>,
    token: &CancellationToken,
) -> AppResult<Vec<PipelineOutput>> {
    let start_time = Instant::now();

    let raw = load_image(input, config.output.max_file_size)?;
    let gray = raw.to_grayscale()?;

    let stages = Stage::expand(config.threshold.method);
    let templated = stages.len() > 1;

    let mut outputs = Vec::with_capacity(stages.len());
    for &stage in stages {
        let path = match output {
            Some(path) if templated => suffixed_path(path, stage.name()),
            Some(path) => path.to_path_buf(),
            None => make_output_path(input, &config.output.results_dir, Some(stage.name()))?,
        };

        let result = run_stage(config, stage, &gray, &path, token);
        match result {
            Ok(out) => outputs.push(out),
            Err(e) => {
                error_logging::log_processing_error(
                    &e,
                    stage.name(),
                    Some(gray.dimensions()),
                    Some(start_time.elapsed()),
                );
                return Err(e);
            }
        }
    }

    info!(
        input = %input.display(),
        outputs = outputs.len(),
        total_ms = start_time.elapsed().as_millis() as u64,
        "Pipeline completed"
    );
    Ok(outputs)
}

fn run_stage(
    config: &AppConfig,
    stage: Stage,
    gray: &GrayscaleImage,
    path: &Path,
    token: &CancellationToken,
) -> AppResult<PipelineOutput> {
    let span = preprocessing_span(stage.name(), gray.width(), gray.height());
    let _guard = span.enter();

    let (white_ratio, processing_time_ms) = match stage {
        Stage::Adaptive(method) => {
            let params = config.threshold.params_for(method);
            let result = apply_adaptive_threshold_cancellable(
                gray,
                &params,
                config.threshold.statistics,
                token,
            )?;
            save_gray(path, result.mask.as_raw(), gray.width(), gray.height())?;
            (Some(result.white_ratio), result.processing_time_ms)
        }
        Stage::Global => {
            token.check()?;
            let result = apply_global_threshold(gray, config.threshold.global_threshold)?;
            let white_ratio = result.mask.count_white() as f32 / gray.len() as f32;
            save_gray(path, result.mask.as_raw(), gray.width(), gray.height())?;
            (Some(white_ratio), result.processing_time_ms)
        }
        Stage::Median => {
            let window = config.median.resolve(|| estimate_window_params(gray))?;
            let result = apply_adaptive_median_filter_cancellable(gray, Some(window), token)?;
            save_gray(path, result.image.as_raw(), gray.width(), gray.height())?;
            (None, result.processing_time_ms)
        }
    };

    let output = PipelineOutput {
        method: stage.name(),
        path: path.to_path_buf(),
        white_ratio,
        processing_time_ms,
    };

    info!(
        method = output.method,
        path = %output.path.display(),
        processing_time_ms = output.processing_time_ms,
        "Result written"
    );
    Ok(output)
}

/// `dir/name.ext` -> `dir/name_<suffix>.ext`
fn suffixed_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut file_name = format!("{}_{}", stem, suffix);
    if let Some(ext) = path.extension() {
        file_name.push('.');
        file_name.push_str(&ext.to_string_lossy());
    }
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_expands_to_three_binarizations() {
        let names: Vec<&str> = Stage::expand(ProcessingMethod::All)
            .iter()
            .map(Stage::name)
            .collect();
        assert_eq!(names, vec!["sauvola", "nick", "global"]);
        assert_eq!(Stage::expand(ProcessingMethod::Median), &[Stage::Median]);
    }

    #[test]
    fn test_suffixed_path() {
        assert_eq!(
            suffixed_path(Path::new("out/result.png"), "nick"),
            PathBuf::from("out/result_nick.png")
        );
        assert_eq!(
            suffixed_path(Path::new("result"), "global"),
            PathBuf::from("result_global")
        );
    }
}
