//! `envmon cert-status`: classify one certificate expiry date.

use chrono::{DateTime, Utc};
use envmon_workflow::{expiry_info, ExpiryInfo};

pub fn status_lines(
    expiry: DateTime<Utc>,
    now: DateTime<Utc>,
    warning_days: i64,
) -> (ExpiryInfo, Vec<String>) {
    let info = expiry_info(expiry, now, warning_days);
    let lines = vec![
        format!("expiry_date={}", expiry.to_rfc3339()),
        format!("now={}", now.to_rfc3339()),
        format!("warning_days={warning_days}"),
        format!("status={}", info.status),
        format!("days_left={}", info.days_left),
    ];
    (info, lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use envmon_workflow::ExpiryStatus;

    #[test]
    fn lines_carry_status_and_days() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let expiry = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let (info, lines) = status_lines(expiry, now, 90);
        assert_eq!(info.status, ExpiryStatus::Expiring);
        assert!(lines.contains(&"status=expiring".to_string()));
        assert!(lines.contains(&"days_left=31".to_string()));
    }
}
