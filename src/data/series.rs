use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use itertools::Itertools;

use crate::error::{DataError, PipelineResult};

/// One cleaned observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, close: f64) -> Self {
        Self { timestamp, close }
    }
}

/// The uniform input of every forecasting back-end.
///
/// # Invariants
/// - non-empty
/// - strictly ascending timestamps (hence no duplicates)
/// - every close is finite
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSeries {
    points: Vec<PricePoint>,
}

impl CanonicalSeries {
    /// Builds a series from arbitrary points using the preprocessor's cleaning rules:
    /// non-finite closes are dropped, points are stably sorted by timestamp and the
    /// last-listed point wins on duplicate timestamps.
    pub fn try_from_points(points: Vec<PricePoint>) -> PipelineResult<Self> {
        let input_rows = points.len();
        let finite: Vec<_> = points.into_iter().filter(|p| p.close.is_finite()).collect();
        let dropped = input_rows - finite.len();
        let (points, _) = sort_dedup_keep_last(finite);
        if points.is_empty() {
            return Err(DataError::Empty {
                input_rows,
                dropped,
            }
            .into());
        }
        Ok(Self { points })
    }

    /// Caller guarantees the invariants.
    pub(crate) fn from_sorted_unchecked(points: Vec<PricePoint>) -> Self {
        debug_assert!(!points.is_empty());
        debug_assert!(points.iter().tuple_windows().all(|(a, b)| a.timestamp < b.timestamp));
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.points.iter().map(|p| p.timestamp).collect()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// The last `k` points (all of them if the series is shorter).
    pub fn tail(&self, k: usize) -> &[PricePoint] {
        &self.points[self.points.len().saturating_sub(k)..]
    }

    /// Time between the first and the last observation.
    pub fn span(&self) -> Duration {
        match (self.first(), self.last()) {
            (Some(a), Some(b)) => b.timestamp - a.timestamp,
            _ => Duration::zero(),
        }
    }

    pub fn cadence(&self) -> Cadence {
        Cadence::infer(&self.points)
    }
}

/// Stable sort by timestamp, then collapse equal timestamps to the last-listed point.
/// Returns the cleaned points and the number of collapsed duplicates.
pub(crate) fn sort_dedup_keep_last(mut points: Vec<PricePoint>) -> (Vec<PricePoint>, usize) {
    points.sort_by_key(|p| p.timestamp);

    let mut out: Vec<PricePoint> = Vec::with_capacity(points.len());
    let mut duplicates = 0;
    for p in points {
        match out.last_mut() {
            Some(prev) if prev.timestamp == p.timestamp => {
                *prev = p;
                duplicates += 1;
            }
            _ => out.push(p),
        }
    }
    (out, duplicates)
}

// ================================================================================================
// Cadence
// ================================================================================================

/// Spacing used to stamp forecast points after the last observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// A fixed calendar step.
    Fixed(Duration),
    /// One day at a time, skipping Saturdays and Sundays.
    BusinessDays,
}

impl Default for Cadence {
    fn default() -> Self {
        Self::Fixed(Duration::days(1))
    }
}

impl Cadence {
    /// Most common gap between consecutive points (smallest gap on ties).
    /// A daily history without any weekend observation is treated as business days.
    pub fn infer(points: &[PricePoint]) -> Self {
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for (a, b) in points.iter().tuple_windows() {
            let gap = (b.timestamp - a.timestamp).num_milliseconds();
            if gap > 0 {
                *counts.entry(gap).or_default() += 1;
            }
        }

        let Some((gap_ms, _)) = counts
            .into_iter()
            .max_by(|(ga, ca), (gb, cb)| ca.cmp(cb).then(gb.cmp(ga)))
        else {
            return Self::default();
        };

        let gap = Duration::milliseconds(gap_ms);
        let has_weekend = points.iter().any(|p| is_weekend(p.timestamp.weekday()));
        if gap == Duration::days(1) && !has_weekend {
            Self::BusinessDays
        } else {
            Self::Fixed(gap)
        }
    }

    pub fn next_after(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Fixed(step) => ts + *step,
            Self::BusinessDays => {
                let mut next = ts + Duration::days(1);
                while is_weekend(next.weekday()) {
                    next += Duration::days(1);
                }
                next
            }
        }
    }

    /// The `n` timestamps following `last`.
    pub fn project(&self, last: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
        let mut out = Vec::with_capacity(n);
        let mut ts = last;
        for _ in 0..n {
            ts = self.next_after(ts);
            out.push(ts);
        }
        out
    }

    /// Step length in days, used by models that work on a continuous time axis.
    pub fn approx_days(&self) -> f64 {
        match self {
            Self::Fixed(step) => step.num_milliseconds() as f64 / MILLIS_PER_DAY,
            Self::BusinessDays => 1.0,
        }
    }
}

pub(crate) const MILLIS_PER_DAY: f64 = 86_400_000.0;

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn points(days: &[(i32, u32, u32)]) -> Vec<PricePoint> {
        days.iter()
            .enumerate()
            .map(|(i, &(y, m, d))| PricePoint::new(day(y, m, d), 100.0 + i as f64))
            .collect()
    }

    #[test]
    fn test_try_from_points_sorts_and_keeps_last() {
        let raw = vec![
            PricePoint::new(day(2024, 1, 3), 3.0),
            PricePoint::new(day(2024, 1, 1), 1.0),
            PricePoint::new(day(2024, 1, 3), 33.0),
            PricePoint::new(day(2024, 1, 2), f64::NAN),
        ];
        let series = CanonicalSeries::try_from_points(raw).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![1.0, 33.0]);
        assert_eq!(series.span(), Duration::days(2));
    }

    #[test]
    fn test_try_from_points_all_invalid_is_empty_error() {
        let raw = vec![PricePoint::new(day(2024, 1, 1), f64::INFINITY)];
        let err = CanonicalSeries::try_from_points(raw).unwrap_err();
        assert!(err.is_empty_data());
    }

    #[test]
    fn test_tail_clamps_to_length() {
        let series =
            CanonicalSeries::try_from_points(points(&[(2024, 1, 1), (2024, 1, 2), (2024, 1, 3)]))
                .unwrap();
        assert_eq!(series.tail(2).len(), 2);
        assert_eq!(series.tail(2)[0].timestamp, day(2024, 1, 2));
        assert_eq!(series.tail(10).len(), 3);
        assert!(series.tail(0).is_empty());
    }

    #[test]
    fn test_calendar_daily_cadence() {
        // Includes a Saturday, so weekends are part of the calendar.
        let pts = points(&[(2024, 1, 5), (2024, 1, 6), (2024, 1, 7), (2024, 1, 8)]);
        let cadence = Cadence::infer(&pts);
        assert_eq!(cadence, Cadence::Fixed(Duration::days(1)));
        assert_eq!(
            cadence.project(day(2024, 1, 8), 2),
            vec![day(2024, 1, 9), day(2024, 1, 10)]
        );
    }

    #[test]
    fn test_business_day_cadence_skips_weekend() {
        // Wed, Thu, Fri, Mon, Tue
        let pts = points(&[
            (2024, 1, 3),
            (2024, 1, 4),
            (2024, 1, 5),
            (2024, 1, 8),
            (2024, 1, 9),
        ]);
        let cadence = Cadence::infer(&pts);
        assert_eq!(cadence, Cadence::BusinessDays);

        // Fri -> Mon
        assert_eq!(cadence.next_after(day(2024, 1, 5)), day(2024, 1, 8));
        assert_eq!(
            cadence.project(day(2024, 1, 11), 3),
            vec![day(2024, 1, 12), day(2024, 1, 15), day(2024, 1, 16)]
        );
    }

    #[test]
    fn test_weekly_cadence_and_tie_break() {
        let pts = points(&[(2024, 1, 1), (2024, 1, 8), (2024, 1, 15), (2024, 1, 22)]);
        assert_eq!(Cadence::infer(&pts), Cadence::Fixed(Duration::days(7)));

        // One 1-day gap and one 2-day gap: the smaller wins.
        let pts = points(&[(2024, 1, 6), (2024, 1, 7), (2024, 1, 9)]);
        assert_eq!(Cadence::infer(&pts), Cadence::Fixed(Duration::days(1)));
    }

    #[test]
    fn test_single_point_defaults_to_one_day() {
        let pts = points(&[(2024, 1, 1)]);
        assert_eq!(Cadence::infer(&pts), Cadence::Fixed(Duration::days(1)));
    }
}
