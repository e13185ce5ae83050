use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Raw reducers
// ---------------------------------------------------------------------------

/// Σ values. Empty input → 0.
pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Arithmetic mean. Empty input → NaN.
pub fn average(values: &[f64]) -> f64 {
    sum(values) / values.len() as f64
}

/// Smallest value. Empty input → +∞.
pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Largest value. Empty input → −∞.
pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Middle value of the ascending sort; mean of the two middle values for
/// even-length input. Empty input → NaN.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(cmp_f64);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 != 0 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Population standard deviation: sqrt(mean((x - mean)^2)). Empty input → NaN.
pub fn standard_deviation(values: &[f64]) -> f64 {
    let avg = average(values);
    let square_diffs: Vec<f64> = values
        .iter()
        .map(|x| {
            let d = x - avg;
            d * d
        })
        .collect();
    average(&square_diffs).sqrt()
}

/// max − min. Empty input → NaN.
pub fn range(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    max(values) - min(values)
}

/// `value` as a percentage of `total`.
pub fn percentage(value: f64, total: f64) -> f64 {
    (value / total) * 100.0
}

/// Fixed-point rendering used when a result is displayed or exported.
pub fn format_result(result: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, result)
}

// NaN sorts last so a stray NaN cannot reorder finite values.
fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
    }
}

// ---------------------------------------------------------------------------
// AggregateFn
// ---------------------------------------------------------------------------

/// The aggregate functions offered on a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFn {
    #[serde(rename = "sum")]
    Sum,
    #[serde(rename = "average")]
    Average,
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "median")]
    Median,
    #[serde(rename = "standardDeviation", alias = "standard_deviation")]
    StandardDeviation,
    #[serde(rename = "range")]
    Range,
}

impl AggregateFn {
    pub const ALL: [AggregateFn; 7] = [
        AggregateFn::Sum,
        AggregateFn::Average,
        AggregateFn::Min,
        AggregateFn::Max,
        AggregateFn::Median,
        AggregateFn::StandardDeviation,
        AggregateFn::Range,
    ];

    /// Wire name, also used inside formula labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Sum => "sum",
            AggregateFn::Average => "average",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Median => "median",
            AggregateFn::StandardDeviation => "standardDeviation",
            AggregateFn::Range => "range",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AggregateFn::Sum => "Sum",
            AggregateFn::Average => "Average",
            AggregateFn::Min => "Minimum",
            AggregateFn::Max => "Maximum",
            AggregateFn::Median => "Median",
            AggregateFn::StandardDeviation => "Standard Deviation",
            AggregateFn::Range => "Range",
        }
    }

    /// Parse a wire name. Accepts `standard_deviation`, `std_dev` and
    /// `stddev` as aliases; case-insensitive.
    pub fn parse(s: &str) -> Result<Self, StatsError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(AggregateFn::Sum),
            "average" | "avg" | "mean" => Ok(AggregateFn::Average),
            "min" => Ok(AggregateFn::Min),
            "max" => Ok(AggregateFn::Max),
            "median" => Ok(AggregateFn::Median),
            "standarddeviation" | "standard_deviation" | "std_dev" | "stddev" => {
                Ok(AggregateFn::StandardDeviation)
            }
            "range" => Ok(AggregateFn::Range),
            _ => Err(StatsError::UnknownFunction(s.to_string())),
        }
    }

    /// `"average(CO2 Level)"`
    pub fn formula(&self, field_name: &str) -> String {
        format!("{}({})", self.as_str(), field_name)
    }

    /// Apply the reducer without the empty-input guard.
    pub fn reduce(&self, values: &[f64]) -> f64 {
        match self {
            AggregateFn::Sum => sum(values),
            AggregateFn::Average => average(values),
            AggregateFn::Min => min(values),
            AggregateFn::Max => max(values),
            AggregateFn::Median => median(values),
            AggregateFn::StandardDeviation => standard_deviation(values),
            AggregateFn::Range => range(values),
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Checked entry point
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    /// The column had no numeric values to aggregate.
    EmptyInput,
    UnknownFunction(String),
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsError::EmptyInput => write!(f, "no numeric values to aggregate"),
            StatsError::UnknownFunction(name) => write!(
                f,
                "unknown aggregate function '{name}'; expected one of: \
                 sum | average | min | max | median | standardDeviation | range"
            ),
        }
    }
}

impl std::error::Error for StatsError {}

/// Apply `func` to a non-empty column.
pub fn apply(func: AggregateFn, values: &[f64]) -> Result<f64, StatsError> {
    if values.is_empty() {
        return Err(StatsError::EmptyInput);
    }
    Ok(func.reduce(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn median_even_length_averages_middle_pair() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn median_odd_length_picks_middle() {
        assert_eq!(median(&[9.0, 1.0, 5.0]), 5.0);
        assert_eq!(median(&[7.0]), 7.0);
    }

    #[test]
    fn median_does_not_reorder_input() {
        let v = vec![3.0, 1.0, 2.0];
        let _ = median(&v);
        assert_eq!(v, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn std_dev_of_constant_sequence_is_zero() {
        assert_eq!(standard_deviation(&[5.0, 5.0, 5.0, 5.0]), 0.0);
        assert!(standard_deviation(&[4.2, 4.2, 4.2]).abs() < EPS);
    }

    #[test]
    fn std_dev_uses_population_formula() {
        // mean 5, squared diffs sum 32, /8 = 4 → 2
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((standard_deviation(&v) - 2.0).abs() < EPS);
    }

    #[test]
    fn range_is_max_minus_min() {
        let v = [450.0, 520.0, 390.5, 610.25];
        assert_eq!(range(&v), max(&v) - min(&v));
        assert_eq!(range(&v), 610.25 - 390.5);
    }

    #[test]
    fn sum_and_average() {
        let v = [65.0, 78.0, 87.0];
        assert_eq!(sum(&v), 230.0);
        assert!((average(&v) - 230.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn negative_values_are_handled() {
        let v = [-3.0, -1.0, -2.0];
        assert_eq!(min(&v), -3.0);
        assert_eq!(max(&v), -1.0);
        assert_eq!(median(&v), -2.0);
        assert_eq!(range(&v), 2.0);
    }

    #[test]
    fn empty_input_follows_ieee_folds() {
        assert_eq!(sum(&[]), 0.0);
        assert!(average(&[]).is_nan());
        assert_eq!(min(&[]), f64::INFINITY);
        assert_eq!(max(&[]), f64::NEG_INFINITY);
        assert!(median(&[]).is_nan());
        assert!(standard_deviation(&[]).is_nan());
        assert!(range(&[]).is_nan());
    }

    #[test]
    fn apply_rejects_empty_column() {
        for f in AggregateFn::ALL {
            assert_eq!(apply(f, &[]), Err(StatsError::EmptyInput));
        }
        assert_eq!(apply(AggregateFn::Max, &[1.0, 3.0]), Ok(3.0));
    }

    #[test]
    fn parse_accepts_wire_names_and_aliases() {
        for f in AggregateFn::ALL {
            assert_eq!(AggregateFn::parse(f.as_str()), Ok(f));
        }
        assert_eq!(
            AggregateFn::parse("standard_deviation"),
            Ok(AggregateFn::StandardDeviation)
        );
        assert_eq!(AggregateFn::parse(" MEAN "), Ok(AggregateFn::Average));
        assert!(matches!(
            AggregateFn::parse("mode"),
            Err(StatsError::UnknownFunction(_))
        ));
    }

    #[test]
    fn serde_accepts_both_std_dev_spellings() {
        let a: AggregateFn = serde_json::from_str("\"standardDeviation\"").unwrap();
        let b: AggregateFn = serde_json::from_str("\"standard_deviation\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&AggregateFn::StandardDeviation).unwrap(),
            "\"standardDeviation\""
        );
    }

    #[test]
    fn formula_and_format() {
        assert_eq!(AggregateFn::Average.formula("PM2.5"), "average(PM2.5)");
        assert_eq!(format_result(2.0 / 3.0, 2), "0.67");
        assert_eq!(format_result(5.0, 0), "5");
        assert_eq!(percentage(25.0, 200.0), 12.5);
    }
}
