use serde::{Deserialize, Serialize};

use crate::aggregate::{self, StatsError};

/// Every aggregate of one column, computed together for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub sum: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub standard_deviation: f64,
    pub range: f64,
}

impl Summary {
    pub fn of(values: &[f64]) -> Result<Self, StatsError> {
        if values.is_empty() {
            return Err(StatsError::EmptyInput);
        }
        let min = aggregate::min(values);
        let max = aggregate::max(values);
        Ok(Self {
            count: values.len(),
            sum: aggregate::sum(values),
            average: aggregate::average(values),
            min,
            max,
            median: aggregate::median(values),
            standard_deviation: aggregate::standard_deviation(values),
            range: max - min,
        })
    }
}
