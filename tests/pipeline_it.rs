use chrono::{Duration, NaiveDate, TimeZone, Utc};
use stockcast::prelude::*;
use strum::IntoEnumIterator;

mod common;

#[test]
fn test_daily_csv_arima_thirty_steps() {
    let raw = common::load_fixture("daily_200.csv");
    let out = stockcast::run(&raw, ModelKind::Arima, Horizon::new(30).unwrap()).unwrap();

    assert_eq!(out.history.len(), 200);
    assert_eq!(out.forecast.len(), 30);
    assert!(out.forecast.values().iter().all(|v| v.is_finite()));

    let last = out.history.last().unwrap().timestamp;
    assert_eq!(last, Utc.with_ymd_and_hms(2023, 7, 19, 0, 0, 0).unwrap());
    let stamps = out.forecast.timestamps();
    assert_eq!(stamps[0], last + Duration::days(1));
    assert!(stamps.windows(2).all(|w| w[1] - w[0] == Duration::days(1)));
}

#[test]
fn test_missing_close_column_is_schema_error() {
    let raw = common::load_fixture("missing_close.csv");
    let err = stockcast::run(&raw, ModelKind::Arima, Horizon::default()).unwrap_err();

    assert!(err.is_schema());
    assert_eq!(err.stage(), Some(Stage::Normalize));
}

#[test]
fn test_five_rows_are_insufficient_for_lstm() {
    let raw = common::load_fixture("short_5.csv");
    let err = stockcast::run(&raw, ModelKind::Lstm, Horizon::new(3).unwrap()).unwrap_err();

    assert!(err.is_insufficient_data());
    assert!(err.to_string().contains("LSTM needs at least 11 observations, got 5"));
}

#[test]
fn test_duplicate_dates_keep_later_row() {
    let raw = common::load_fixture("duplicates.csv");
    let normalized = normalize(&raw).unwrap();

    assert_eq!(normalized.series.closes(), vec![100.0, 150.0, 102.0]);
    assert_eq!(normalized.summary.duplicate_rows, 1);
}

#[test]
fn test_messy_table_is_cleaned() {
    let raw = common::load_fixture("messy.csv");
    let normalized = normalize(&raw).unwrap();

    assert_eq!(normalized.summary.close_column.trim(), "Adj Close");
    assert_eq!(normalized.summary.date_column, "TIMESTAMP");
    assert_eq!(normalized.summary.input_rows, 6);
    assert_eq!(normalized.summary.dropped_rows, 2);
    assert_eq!(normalized.series.closes(), vec![10.25, 10.75, 10.5, 11.25]);
}

#[test]
fn test_overflowing_series_is_arima_fit_error() {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let mut csv = String::from("Date,Close\n");
    for i in 0..60 {
        let close = if i % 2 == 0 { 1e300 } else { -1e300 };
        csv.push_str(&format!("{},{close:e}\n", start + Duration::days(i)));
    }
    let raw = RawTable::try_from(csv.as_str()).unwrap();

    let err = Pipeline::new(common::fast_config(ModelKind::Arima, 5))
        .unwrap()
        .run(&raw)
        .unwrap_err();

    assert!(err.is_model_fit(), "{err}");
    assert_eq!(err.stage(), Some(Stage::Forecast));
    assert!(err.to_string().contains("ARIMA"));
}

#[test]
fn test_day_first_dates_are_not_swapped() {
    let mut csv = String::from("Date,Close\n");
    for d in 10..=20 {
        csv.push_str(&format!("{d:02}/01/2024,{}\n", 100 + d));
    }
    let normalized = normalize(&RawTable::try_from(csv.as_str()).unwrap()).unwrap();

    assert_eq!(normalized.summary.dropped_rows, 0);
    assert_eq!(normalized.series.len(), 11);
    let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
    assert_eq!(normalized.series.timestamps()[0], day(10));
    assert_eq!(normalized.series.timestamps()[10], day(20));
}

#[test]
fn test_every_model_returns_horizon_points() {
    let raw = common::daily_table(60);
    for model in ModelKind::iter() {
        let out = Pipeline::new(common::fast_config(model, 7))
            .unwrap()
            .run(&raw)
            .unwrap_or_else(|e| panic!("{model} failed: {e}"));

        assert_eq!(out.forecast.len(), 7, "{model}");
        assert_eq!(out.forecast.model(), model);
        assert!(out.forecast.values().iter().all(|v| v.is_finite()), "{model}");
    }
}

#[test]
fn test_every_model_rejects_too_short_series() {
    let cfg = PipelineConfig::default();
    let series = normalize_series(&common::daily_table(1)).unwrap();
    for model in ModelKind::iter() {
        let forecaster = model.forecaster(&cfg);
        let err = forecaster.forecast(&series, Horizon::new(3).unwrap()).unwrap_err();
        assert!(err.is_insufficient_data(), "{model}: {err}");
    }
}

#[test]
fn test_minimum_lengths_are_enough() {
    let cfg = common::fast_config(ModelKind::Arima, 4);
    for model in ModelKind::iter() {
        let forecaster = model.forecaster(&cfg);
        let n = forecaster.min_observations();
        let series = normalize_series(&common::daily_table(n)).unwrap();

        let fc = forecaster
            .forecast(&series, Horizon::new(4).unwrap())
            .unwrap_or_else(|e| panic!("{model} at {n} points: {e}"));
        assert_eq!(fc.len(), 4);

        let shorter = normalize_series(&common::daily_table(n - 1)).unwrap();
        assert!(
            forecaster
                .forecast(&shorter, Horizon::new(4).unwrap())
                .unwrap_err()
                .is_insufficient_data()
        );
    }
}

#[test]
fn test_lstm_fixed_seed_is_bit_identical() {
    let raw = common::daily_table(50);
    let pipeline = Pipeline::new(
        common::fast_config(ModelKind::Lstm, 10)
            .with_lstm(LstmConfig::default().with_window(6).with_epochs(4).with_seed(Some(99))),
    )
    .unwrap();

    let a = pipeline.run(&raw).unwrap();
    let b = pipeline.run(&raw).unwrap();
    let bits = |fc: &ForecastSeries| fc.values().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&a.forecast), bits(&b.forecast));
}

#[test]
fn test_business_day_history_skips_weekends() {
    // Weekdays only, ending on Friday 2024-03-29.
    let mut csv = String::from("Date,Close\n");
    let mut date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 3, 29).unwrap();
    let mut i = 0.0;
    while date <= end {
        if !matches!(date.format("%a").to_string().as_str(), "Sat" | "Sun") {
            csv.push_str(&format!("{date},{}\n", 50.0 + i));
            i += 0.5;
        }
        date += Duration::days(1);
    }
    let raw = RawTable::try_from(csv.as_str()).unwrap();

    let out = stockcast::run(&raw, ModelKind::Prophet, Horizon::new(3).unwrap()).unwrap();
    let day = |d| Utc.with_ymd_and_hms(2024, 4, d, 0, 0, 0).unwrap();
    assert_eq!(out.forecast.timestamps(), vec![day(1), day(2), day(3)]);
}

#[test]
fn test_display_series_assembly() {
    let raw = common::daily_table(40);
    let out = Pipeline::new(common::fast_config(ModelKind::Prophet, 5).with_display_tail(12))
        .unwrap()
        .run(&raw)
        .unwrap();

    let display = out.display_default();
    assert_eq!(display.len(), 17);
    assert_eq!(display.historical().count(), 12);
    assert_eq!(display.forecast().count(), 5);
    assert!(display.points()[..12].iter().all(|p| p.kind == SeriesKind::Historical));
    assert_eq!(
        display.points()[12].timestamp,
        out.forecast.points()[0].timestamp
    );
}

#[test]
fn test_config_file_drives_pipeline() {
    let cfg = PipelineConfig::from_json_str(
        r#"{ "model": "prophet", "horizon": 9, "prophet": { "n_changepoints": 5 } }"#,
    )
    .unwrap();
    let out = Pipeline::new(cfg).unwrap().run(&common::daily_table(30)).unwrap();

    assert_eq!(out.forecast.model(), ModelKind::Prophet);
    assert_eq!(out.forecast.len(), 9);
}

#[test]
fn test_bundled_dataset_forecasts() {
    let raw = RawTable::bundled().unwrap();
    let out = stockcast::run(&raw, ModelKind::Arima, Horizon::default()).unwrap();

    assert_eq!(out.forecast.len(), 30);
    assert_eq!(out.summary.dropped_rows, 0);
    // Weekday-only history continues on business days.
    assert!(out.forecast.timestamps().iter().all(|t| {
        use chrono::Datelike;
        !matches!(t.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
    }));
}
