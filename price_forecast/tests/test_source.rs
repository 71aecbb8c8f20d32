use chrono::{TimeZone, Utc};
use price_forecast::source::validate_identifier;
use price_forecast::utils::parse_date;
use price_forecast::{CsvHistorySource, ForecastError, HistoryRequest, HistorySource, Period};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::fs;
use tempfile::{tempdir, TempDir};

// Helper function to create a directory with one CSV history file
fn create_history_dir() -> TempDir {
    let dir = tempdir().unwrap();
    let contents = "\
Date,Open,Close,Volume
2023-01-02,99.0,100.0,1000
2023-01-03,100.5,101.5,1200
2023-01-04,101.0,100.8,900
2023-01-05,100.9,102.2,1500
2023-01-06,102.0,103.0,1100
";
    fs::write(dir.path().join("ACME.csv"), contents).unwrap();
    dir
}

#[test]
fn test_csv_source_reads_close_column() {
    let dir = create_history_dir();
    let source = CsvHistorySource::new(dir.path());

    let series = source
        .fetch(&HistoryRequest::new("ACME", Period::Max))
        .unwrap();

    assert_eq!(series.len(), 5);
    assert_eq!(series.values(), vec![100.0, 101.5, 100.8, 102.2, 103.0]);
    assert_eq!(
        series.first().unwrap().timestamp,
        Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap()
    );
}

#[test]
fn test_csv_source_respects_half_open_range() {
    let dir = create_history_dir();
    let source = CsvHistorySource::new(dir.path());
    let request = HistoryRequest::new("ACME", Period::Max)
        .starting(Some(parse_date("2023-01-03").unwrap()))
        .ending(Some(parse_date("2023-01-05").unwrap()));

    let series = source.fetch(&request).unwrap();

    assert_eq!(series.values(), vec![101.5, 100.8]);
}

#[test]
fn test_missing_file_is_permanent() {
    let dir = create_history_dir();
    let source = CsvHistorySource::new(dir.path());

    let err = source
        .fetch(&HistoryRequest::new("NONE", Period::Max))
        .unwrap_err();

    match err {
        ForecastError::DataSource {
            identifier,
            transient,
            ..
        } => {
            assert_eq!(identifier, "NONE");
            assert!(!transient);
        }
        other => panic!("Expected DataSource error, got {:?}", other),
    }
}

#[test]
fn test_unordered_rows_are_rejected() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("BAD.csv"),
        "date,close\n2023-01-03,1.0\n2023-01-02,2.0\n",
    )
    .unwrap();
    let source = CsvHistorySource::new(dir.path());

    let err = source.load("BAD").unwrap_err();
    assert!(matches!(err, ForecastError::DataError(_)));
}

#[test]
fn test_malformed_close_is_csv_error() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("BAD.csv"), "date,close\n2023-01-02,abc\n").unwrap();
    let source = CsvHistorySource::new(dir.path());

    let err = source.load("BAD").unwrap_err();
    assert!(matches!(err, ForecastError::CsvError(_)));
}

#[rstest]
#[case("max", Period::Max)]
#[case("30d", Period::Days(30))]
#[case("4wk", Period::Weeks(4))]
#[case("6mo", Period::Months(6))]
#[case("5y", Period::Years(5))]
fn test_period_grammar(#[case] input: &str, #[case] expected: Period) {
    assert_eq!(input.parse::<Period>().unwrap(), expected);
    assert_eq!(expected.to_string(), input);
}

#[rstest]
#[case("AAPL", true)]
#[case("BRK-B", true)]
#[case("EURUSD=X", true)]
#[case("^GSPC", true)]
#[case("msft", false)]
#[case("", false)]
#[case("ABCDEFGHIJK", false)]
#[case("A/B", false)]
fn test_identifier_rules(#[case] identifier: &str, #[case] valid: bool) {
    assert_eq!(validate_identifier(identifier).is_ok(), valid);
}

#[rstest]
#[case("2023-06-30", Utc.with_ymd_and_hms(2023, 6, 30, 0, 0, 0).unwrap())]
#[case("2023-06-30T15:30:00Z", Utc.with_ymd_and_hms(2023, 6, 30, 15, 30, 0).unwrap())]
#[case("2023-06-30T17:30:00+02:00", Utc.with_ymd_and_hms(2023, 6, 30, 15, 30, 0).unwrap())]
fn test_date_formats(#[case] input: &str, #[case] expected: chrono::DateTime<Utc>) {
    assert_eq!(parse_date(input).unwrap(), expected);
}

#[test]
fn test_invalid_date() {
    assert!(parse_date("30/06/2023").is_err());
}
