use std::sync::Arc;

use polars::prelude::{DataType, Field, PlSmallStr, Schema, SchemaRef, TimeUnit};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Column vocabulary of every frame this crate produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SeriesCol {
    /// Observation time (UTC, millisecond precision).
    Timestamp,
    /// Closing price of a historical observation.
    Close,
    /// 1-based position of a forecast point after the last observation.
    Step,
    /// Predicted price.
    Forecast,
    /// Price of a display point, historical or predicted.
    Value,
    /// `historical` or `forecast`.
    Kind,
}

impl From<SeriesCol> for PlSmallStr {
    fn from(value: SeriesCol) -> Self {
        value.as_str().into()
    }
}

impl SeriesCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn dtype(&self) -> DataType {
        match self {
            Self::Timestamp => DataType::Datetime(TimeUnit::Milliseconds, None),
            Self::Close | Self::Forecast | Self::Value => DataType::Float64,
            Self::Step => DataType::UInt32,
            Self::Kind => DataType::String,
        }
    }

    pub fn field(&self) -> Field {
        Field::new(self.name(), self.dtype())
    }
}

pub fn history_schema() -> SchemaRef {
    Arc::new(Schema::from_iter([
        SeriesCol::Timestamp.field(),
        SeriesCol::Close.field(),
    ]))
}

pub fn forecast_schema() -> SchemaRef {
    Arc::new(Schema::from_iter([
        SeriesCol::Step.field(),
        SeriesCol::Timestamp.field(),
        SeriesCol::Forecast.field(),
    ]))
}

pub fn display_schema() -> SchemaRef {
    Arc::new(Schema::from_iter([
        SeriesCol::Timestamp.field(),
        SeriesCol::Value.field(),
        SeriesCol::Kind.field(),
    ]))
}

// ================================================================================================
// Source Column Aliases
// ================================================================================================

/// Accepted names of the date column in uploaded tables, in priority order.
/// Matching is case-insensitive and ignores surrounding whitespace.
pub const DATE_ALIASES: &[&str] = &["date", "datetime", "timestamp", "time"];

/// Accepted names of the closing-price column, in priority order.
pub const CLOSE_ALIASES: &[&str] = &["close", "close_price", "adj close", "adj_close"];

/// Finds the source column for a field: the first alias with a match wins,
/// the leftmost column wins among several matches of one alias.
pub fn match_column<'a, S: AsRef<str>>(columns: &'a [S], aliases: &[&str]) -> Option<&'a str> {
    aliases.iter().find_map(|alias| {
        columns
            .iter()
            .map(AsRef::as_ref)
            .find(|c| c.trim().eq_ignore_ascii_case(alias))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_is_case_insensitive() {
        let cols = ["Open", " DATE ", "Close", "Volume"];
        assert_eq!(match_column(&cols, DATE_ALIASES), Some(" DATE "));
        assert_eq!(match_column(&cols, CLOSE_ALIASES), Some("Close"));
    }

    #[test]
    fn test_alias_priority_beats_column_order() {
        let cols = ["Adj Close", "close"];
        assert_eq!(match_column(&cols, CLOSE_ALIASES), Some("close"));

        let cols = ["Timestamp", "Date"];
        assert_eq!(match_column(&cols, DATE_ALIASES), Some("Date"));
    }

    #[test]
    fn test_leftmost_column_wins_within_alias() {
        let cols = ["CLOSE", "close"];
        assert_eq!(match_column(&cols, CLOSE_ALIASES), Some("CLOSE"));
    }

    #[test]
    fn test_missing_column() {
        let cols = ["Date", "Open", "High"];
        assert_eq!(match_column(&cols, CLOSE_ALIASES), None);
    }
}
