//! `envmon stats`: run one aggregate over inline values or a CSV column.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use envmon_stats::AggregateFn;

use crate::commands::csv_column;

#[derive(Debug)]
pub struct StatsArgs {
    pub function: String,
    pub values: Vec<f64>,
    pub csv: Option<PathBuf>,
    pub column: Option<String>,
    pub decimals: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsOutcome {
    pub function: AggregateFn,
    pub count: usize,
    pub result: f64,
    pub formatted: String,
}

impl StatsOutcome {
    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("function={}", self.function),
            format!("label={}", self.function.label()),
            format!("count={}", self.count),
            format!("result={}", self.result),
            format!("formatted={}", self.formatted),
        ]
    }
}

pub fn run(args: StatsArgs) -> Result<StatsOutcome> {
    let function = AggregateFn::parse(&args.function)?;

    let values = match (&args.csv, &args.column) {
        (Some(path), Some(column)) => {
            if !args.values.is_empty() {
                bail!("pass either inline values or --csv, not both");
            }
            csv_column::read_column_file(path, column)
                .with_context(|| format!("reading column '{column}' from {}", path.display()))?
        }
        (Some(_), None) => bail!("--csv requires --column"),
        (None, Some(_)) => bail!("--column requires --csv"),
        (None, None) => args.values,
    };

    let result = envmon_stats::apply(function, &values)?;
    Ok(StatsOutcome {
        function,
        count: values.len(),
        result,
        formatted: envmon_stats::format_result(result, args.decimals),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(function: &str, values: &[f64]) -> StatsArgs {
        StatsArgs {
            function: function.to_string(),
            values: values.to_vec(),
            csv: None,
            column: None,
            decimals: 2,
        }
    }

    #[test]
    fn inline_median() {
        let out = run(inline("median", &[4.0, 1.0, 3.0, 2.0])).unwrap();
        assert_eq!(out.function, AggregateFn::Median);
        assert_eq!(out.result, 2.5);
        assert_eq!(out.formatted, "2.50");
        assert_eq!(out.lines()[1], "label=Median");
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = run(inline("sum", &[])).unwrap_err();
        assert!(err.to_string().contains("no numeric values"));
    }

    #[test]
    fn column_without_csv_is_rejected() {
        let mut args = inline("sum", &[1.0]);
        args.column = Some("x".into());
        let err = run(args).unwrap_err();
        assert_eq!(err.to_string(), "--column requires --csv");
    }
}
