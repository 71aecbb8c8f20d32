use price_forecast::utils::parse_date;
use price_forecast::{
    CsvHistorySource, CsvReportSink, ForecastConfig, ForecastRequest, Forecaster, ModelConfig,
};
use std::env;
use std::path::PathBuf;

// Usage: csv_forecast [IDENTIFIER] [TRAIN_END] [CONFIG_JSON]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let identifier = args.first().map(String::as_str).unwrap_or("ACME");
    let train_end = parse_date(args.get(1).map(String::as_str).unwrap_or("2023-10-02"))?;

    let config = match args.get(2) {
        Some(path) => ForecastConfig::from_json_file(path)?,
        None => ForecastConfig::default()
            .with_window_len(30)
            .with_future_days(5)
            .with_model(ModelConfig {
                epochs: 50,
                seed: Some(42),
                ..ModelConfig::feedforward()
            }),
    };

    let data_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("examples")
        .join("csv");
    println!("Loading {} history from: {}", identifier, data_dir.display());

    let forecaster = Forecaster::new(CsvHistorySource::new(&data_dir), config)?;
    let result = forecaster.predict(&ForecastRequest::new(identifier, train_end))?;

    println!("{}", result);
    println!(
        "Trained {} epochs, final loss {:.6}",
        result.training.epochs_run,
        result.training.final_loss().unwrap_or(f64::NAN)
    );

    let report_path = env::temp_dir().join(format!("{}_heldout.csv", identifier));
    result.render_to(&mut CsvReportSink::new(&report_path))?;
    println!("Held-out comparison written to {}", report_path.display());

    Ok(())
}
