//! # Observability Tests Module
//!
//! Metric and span helpers plus environment-driven logging configuration.

#[cfg(test)]
mod tests {
    use adaptive_binarization::observability;
    use adaptive_binarization::observability_config::{LogFormat, ObservabilityConfig};
    use std::time::Duration;

    /// Recording helpers are no-ops without an installed recorder
    #[test]
    fn test_metrics_recording() {
        observability::record_preprocessing_metrics("sauvola", Duration::from_millis(12), 640 * 480);
        observability::record_preprocessing_metrics("median", Duration::ZERO, 0);
        observability::record_io_metrics("load", true, 1024);
        observability::record_io_metrics("save", false, 0);
    }

    #[test]
    fn test_span_creation() {
        let span = observability::preprocessing_span("nick", 100, 50);
        let _guard = span.enter();

        let io = observability::io_span("load", "/tmp/page.png");
        let _io_guard = io.enter();
    }

    #[test]
    fn test_production_defaults_to_json() {
        let config = ObservabilityConfig {
            environment: "production".to_string(),
            ..Default::default()
        };
        assert!(config.is_production());
        assert_eq!(config.effective_log_format(), LogFormat::Json);

        let explicit = ObservabilityConfig {
            log_format: Some(LogFormat::Pretty),
            ..config
        };
        assert_eq!(explicit.effective_log_format(), LogFormat::Pretty);
    }

    #[test]
    fn test_development_config() {
        let config = ObservabilityConfig::default();
        assert!(config.is_development());
        assert!(!config.enable_metrics);
        assert_eq!(config.effective_log_format(), LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let empty = ObservabilityConfig {
            log_level: "  ".to_string(),
            ..Default::default()
        };
        assert!(empty.validate().is_err());

        let directive = ObservabilityConfig {
            log_level: "adaptive_binarization=debug".to_string(),
            ..Default::default()
        };
        assert!(directive.validate().is_ok());
    }
}
