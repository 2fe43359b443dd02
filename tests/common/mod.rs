#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{Duration, NaiveDate};
use stockcast::prelude::*;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn load_fixture(name: &str) -> RawTable {
    RawTable::from_csv_path(fixture_path(name)).expect("fixture should load")
}

/// Fresh, empty directory under the integration-test scratch space.
pub fn output_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// `n` consecutive calendar days from 2023-01-01 with a noisy upward drift.
pub fn daily_table(n: usize) -> RawTable {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).expect("valid date");
    let mut csv = String::from("Date,Close\n");
    for i in 0..n {
        let date = start + Duration::days(i as i64);
        let close = 100.0 + 0.2 * i as f64 + 2.0 * (i as f64 / 3.0).sin();
        csv.push_str(&format!("{date},{close:.4}\n"));
    }
    RawTable::try_from(csv.as_str()).expect("valid csv")
}

/// Small configurations that keep the LSTM quick in debug builds.
pub fn fast_config(model: ModelKind, horizon: usize) -> PipelineConfig {
    PipelineConfig::default()
        .with_model(model)
        .with_horizon(Horizon::new(horizon).expect("positive horizon"))
        .with_lstm(
            LstmConfig::default()
                .with_window(5)
                .with_hidden(8)
                .with_epochs(5),
        )
}
