//! Numeric extraction from proforma cells.
//!
//! Cells hold arbitrary JSON. A cell counts as numeric when it is a JSON
//! number or a string that parses in full as a finite number; everything
//! else (blank, text, `"NaN"`, `"inf"`) is skipped.

use envmon_schemas::Proforma;
use serde_json::Value;

pub fn numeric_value(v: &Value) -> Option<f64> {
    let x = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    x.is_finite().then_some(x)
}

/// Numeric values of `field_id` across every row, in row order.
pub fn column_values(proforma: &Proforma, field_id: &str) -> Vec<f64> {
    proforma
        .rows
        .iter()
        .filter_map(|row| row.data.get(field_id))
        .filter_map(numeric_value)
        .collect()
}

/// `true` when the cell holds nothing a user typed.
pub fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_and_numeric_strings_count() {
        assert_eq!(numeric_value(&json!(450)), Some(450.0));
        assert_eq!(numeric_value(&json!(" 65.5 ")), Some(65.5));
        assert_eq!(numeric_value(&json!("-2e3")), Some(-2000.0));
    }

    #[test]
    fn text_and_non_finite_are_skipped() {
        assert_eq!(numeric_value(&json!("Block A")), None);
        assert_eq!(numeric_value(&json!("")), None);
        assert_eq!(numeric_value(&json!("NaN")), None);
        assert_eq!(numeric_value(&json!("inf")), None);
        assert_eq!(numeric_value(&json!(true)), None);
        assert_eq!(numeric_value(&Value::Null), None);
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&json!("   ")));
        assert!(!is_blank(&json!(0)));
        assert!(!is_blank(&json!("x")));
    }
}
