use price_forecast::{ForecastConfig, ForecastError, ModelKind, Period, RetryPolicy};
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_config_from_json_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{
            "period": "10y",
            "window_len": 60,
            "future_days": 5,
            "model": {{ "kind": "feedforward", "hidden_width": 32, "seed": 7 }},
            "retry": {{ "max_attempts": 5, "initial_delay_ms": 100 }}
        }}"#
    )
    .unwrap();

    let config = ForecastConfig::from_json_file(file.path()).unwrap();

    assert_eq!(config.period, Period::Years(10));
    assert_eq!(config.window_len, 60);
    assert_eq!(config.future_days, 5);
    assert_eq!(config.model.kind, ModelKind::Feedforward);
    assert_eq!(config.model.hidden_width, 32);
    assert_eq!(config.model.seed, Some(7));
    assert_eq!(config.model.epochs, 25);
    assert_eq!(
        config.retry,
        RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 100,
            ..RetryPolicy::default()
        }
    );
}

#[test]
fn test_empty_json_is_default() {
    let config = ForecastConfig::from_json_str("{}").unwrap();
    assert_eq!(config, ForecastConfig::default());
}

#[test]
fn test_missing_file_is_io_error() {
    let err = ForecastConfig::from_json_file("/nonexistent/forecast.json").unwrap_err();
    assert!(matches!(err, ForecastError::IoError(_)));
}

#[test]
fn test_malformed_json_is_json_error() {
    let err = ForecastConfig::from_json_str("{ window_len: 3 ").unwrap_err();
    assert!(matches!(err, ForecastError::JsonError(_)));
}

#[test]
fn test_invalid_options_are_rejected() {
    let cases = [
        r#"{ "window_len": 0 }"#,
        r#"{ "model": { "epochs": 0 } }"#,
        r#"{ "model": { "batch_size": 0 } }"#,
        r#"{ "model": { "learning_rate": -0.1 } }"#,
        r#"{ "retry": { "max_attempts": 0 } }"#,
    ];

    for json in cases {
        let err = ForecastConfig::from_json_str(json).unwrap_err();
        assert!(
            matches!(err, ForecastError::InvalidParameter(_)),
            "{} gave {:?}",
            json,
            err
        );
    }
}

#[test]
fn test_oversized_period_is_rejected() {
    let err = ForecastConfig::from_json_str(r#"{ "period": "1000000y" }"#).unwrap_err();
    assert!(matches!(err, ForecastError::JsonError(_)));
    assert!(err.to_string().contains("1000000y"));
}

#[test]
fn test_config_serializes_back() {
    let config = ForecastConfig::default().with_window_len(20);
    let json = serde_json::to_string(&config).unwrap();

    assert!(json.contains(r#""period":"max""#));
    assert_eq!(ForecastConfig::from_json_str(&json).unwrap(), config);
}
