use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::{DataType, IntoLazy, col};

use crate::{
    data::{
        schema::{CLOSE_ALIASES, DATE_ALIASES, SeriesCol, match_column},
        series::{CanonicalSeries, PricePoint, sort_dedup_keep_last},
        table::RawTable,
    },
    error::{DataError, PipelineResult},
};

/// Naive date-time layouts tried in order after RFC 3339.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Date-only layouts, interpreted as midnight UTC. Month-first precedes day-first.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y", "%d.%m.%Y"];

/// Layouts carrying an explicit UTC offset, tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%:z"];

/// How the cells of one date column are written.
///
/// A column is read with a single layout: mixing `03/04/2024` (month-first) with
/// `25/04/2024` (day-first) in one column would otherwise swap day and month silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateLayout {
    Rfc3339,
    Offset(&'static str),
    DateTime(&'static str),
    Date(&'static str),
}

impl DateLayout {
    /// All layouts in precedence order.
    pub fn candidates() -> impl Iterator<Item = DateLayout> {
        std::iter::once(Self::Rfc3339)
            .chain(OFFSET_FORMATS.iter().copied().map(Self::Offset))
            .chain(DATETIME_FORMATS.iter().copied().map(Self::DateTime))
            .chain(DATE_FORMATS.iter().copied().map(Self::Date))
    }

    pub fn parse(&self, s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        match self {
            Self::Rfc3339 => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Offset(f) => DateTime::parse_from_str(s, f)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::DateTime(f) => NaiveDateTime::parse_from_str(s, f)
                .ok()
                .map(|naive| naive.and_utc()),
            Self::Date(f) => NaiveDate::parse_from_str(s, f)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc()),
        }
    }

    /// Picks the layout that reads the most non-blank cells, earlier layouts winning ties.
    ///
    /// Returns `Ok(None)` when no layout reads any cell. A cell the winner cannot read
    /// but another layout can means the column mixes layouts, which is a schema error.
    pub fn detect(column: &str, cells: &[&str]) -> Result<Option<Self>, DataError> {
        let cells: Vec<&str> = cells
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();

        let mut best: Option<(Self, usize)> = None;
        for layout in Self::candidates() {
            let hits = cells.iter().filter(|c| layout.parse(c).is_some()).count();
            if hits > best.map_or(0, |(_, n)| n) {
                best = Some((layout, hits));
            }
        }
        let Some((layout, _)) = best else {
            return Ok(None);
        };

        let stray = cells
            .iter()
            .find(|c| layout.parse(c).is_none() && Self::candidates().any(|l| l.parse(c).is_some()));
        if let Some(cell) = stray {
            return Err(DataError::Schema(format!(
                "Date column `{column}` mixes layouts: most cells match {layout} but {cell:?} does not"
            )));
        }
        Ok(Some(layout))
    }
}

impl std::fmt::Display for DateLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rfc3339 => f.write_str("RFC 3339"),
            Self::Offset(fmt) | Self::DateTime(fmt) | Self::Date(fmt) => write!(f, "`{fmt}`"),
        }
    }
}

/// Row accounting of one normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeSummary {
    /// Source column used as the date field.
    pub date_column: String,
    /// Source column used as the closing-price field.
    pub close_column: String,
    pub input_rows: usize,
    /// Rows with an unparseable date, an unparseable price or a non-finite price.
    pub dropped_rows: usize,
    /// Rows collapsed because a later row carried the same timestamp.
    pub duplicate_rows: usize,
}

impl NormalizeSummary {
    pub fn output_rows(&self) -> usize {
        self.input_rows - self.dropped_rows - self.duplicate_rows
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub series: CanonicalSeries,
    pub summary: NormalizeSummary,
}

/// Turns a raw table into a [`CanonicalSeries`].
///
/// # Policy
/// - Date and close columns are located case-insensitively (see [`DATE_ALIASES`],
///   [`CLOSE_ALIASES`]); a missing one is a schema error.
/// - The date column is read with one [`DateLayout`]; a column mixing layouts is a schema error.
/// - Rows with an unparseable date or a non-numeric/non-finite price are dropped and counted.
/// - Rows are sorted ascending by timestamp; on duplicate timestamps the later-listed row wins.
/// - Zero surviving rows is an empty-data error.
#[tracing::instrument(skip_all, fields(rows = raw.height()))]
pub fn normalize(raw: &RawTable) -> PipelineResult<Normalized> {
    let columns = raw.column_names();
    let date_column = match_column(&columns, DATE_ALIASES)
        .ok_or_else(|| missing_field("date", DATE_ALIASES, &columns))?
        .to_string();
    let close_column = match_column(&columns, CLOSE_ALIASES)
        .ok_or_else(|| missing_field("close", CLOSE_ALIASES, &columns))?
        .to_string();

    let df = raw
        .as_df()
        .clone()
        .lazy()
        .select([
            col(date_column.as_str())
                .cast(DataType::String)
                .alias(SeriesCol::Timestamp),
            col(close_column.as_str())
                .cast(DataType::Float64)
                .alias(SeriesCol::Close),
        ])
        .collect()
        .map_err(|e| DataError::DataFrame(format!("Failed to select source columns: {e}")))?;

    let dates = df
        .column(SeriesCol::Timestamp.as_str())
        .and_then(|c| c.str())
        .map_err(|e| DataError::DataFrame(e.to_string()))?;
    let closes = df
        .column(SeriesCol::Close.as_str())
        .and_then(|c| c.f64())
        .map_err(|e| DataError::DataFrame(e.to_string()))?;

    let input_rows = df.height();
    let cells: Vec<Option<&str>> = dates.into_iter().collect();
    let present: Vec<&str> = cells.iter().flatten().copied().collect();
    let layout = DateLayout::detect(&date_column, &present)?;
    tracing::debug!(layout = ?layout, "Date layout detected");

    let points: Vec<PricePoint> = cells
        .into_iter()
        .zip(closes.into_iter())
        .filter_map(|(date, close)| {
            let timestamp = layout?.parse(date?)?;
            let close = close.filter(|c| c.is_finite())?;
            Some(PricePoint::new(timestamp, close))
        })
        .collect();

    let dropped_rows = input_rows - points.len();
    if dropped_rows > 0 {
        tracing::warn!(
            dropped = dropped_rows,
            input = input_rows,
            "Dropped rows with unparseable date or price"
        );
    }

    let (points, duplicate_rows) = sort_dedup_keep_last(points);
    if duplicate_rows > 0 {
        tracing::debug!(
            duplicates = duplicate_rows,
            "Collapsed duplicate timestamps (last row kept)"
        );
    }

    if points.is_empty() {
        return Err(DataError::Empty {
            input_rows,
            dropped: dropped_rows,
        }
        .into());
    }

    let summary = NormalizeSummary {
        date_column,
        close_column,
        input_rows,
        dropped_rows,
        duplicate_rows,
    };
    tracing::debug!(rows = summary.output_rows(), "Series normalized");

    Ok(Normalized {
        series: CanonicalSeries::from_sorted_unchecked(points),
        summary,
    })
}

/// Same as [`normalize`], without the row accounting.
pub fn normalize_series(raw: &RawTable) -> PipelineResult<CanonicalSeries> {
    normalize(raw).map(|n| n.series)
}

/// Parses a lone date cell with the first matching layout. Values without an offset are
/// taken as UTC. Columns go through [`DateLayout::detect`] instead.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateLayout::candidates().find_map(|layout| layout.parse(s))
}

fn missing_field(field: &str, aliases: &[&str], available: &[String]) -> DataError {
    DataError::Schema(format!(
        "Missing {field} column (accepted names: {}); available columns: [{}]",
        aliases.join(", "),
        available.join(", ")
    ))
}
