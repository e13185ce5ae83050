//! ISO certificate register and expiry classification.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use envmon_schemas::{IsoCertificate, User};
use serde::{Deserialize, Serialize};

use crate::access::{authorize, Action};
use crate::error::DeskError;

pub const DEFAULT_WARNING_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStatus {
    Active,
    Expiring,
    Expired,
}

impl ExpiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryStatus::Active => "active",
            ExpiryStatus::Expiring => "expiring",
            ExpiryStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for ExpiryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryInfo {
    pub status: ExpiryStatus,
    /// Whole days until expiry, partial days truncated; 0 once expired.
    pub days_left: i64,
}

/// Classify `expiry` relative to `now`.
pub fn expiry_info(expiry: DateTime<Utc>, now: DateTime<Utc>, warning_days: i64) -> ExpiryInfo {
    if expiry < now {
        return ExpiryInfo {
            status: ExpiryStatus::Expired,
            days_left: 0,
        };
    }
    let days_left = (expiry - now).num_days();
    let status = if days_left <= warning_days {
        ExpiryStatus::Expiring
    } else {
        ExpiryStatus::Active
    };
    ExpiryInfo { status, days_left }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCertificate {
    pub name: String,
    pub department: String,
    pub expiry_date: DateTime<Utc>,
    #[serde(default)]
    pub file_url: String,
}

#[derive(Debug)]
pub struct CertificateRegister {
    certs: Vec<IsoCertificate>,
    warning_days: i64,
    seq: u64,
}

impl Default for CertificateRegister {
    fn default() -> Self {
        Self::new(DEFAULT_WARNING_DAYS)
    }
}

impl CertificateRegister {
    pub fn new(warning_days: i64) -> Self {
        Self {
            certs: Vec::new(),
            warning_days,
            seq: 0,
        }
    }

    pub fn warning_days(&self) -> i64 {
        self.warning_days
    }

    pub fn all(&self) -> &[IsoCertificate] {
        &self.certs
    }

    pub fn upload(
        &mut self,
        cert: NewCertificate,
        actor: &User,
        now: DateTime<Utc>,
    ) -> Result<&IsoCertificate, DeskError> {
        authorize(actor, Action::UploadIsoCertificate, None)?;

        let name = cert.name.trim();
        let department = cert.department.trim();
        if name.is_empty() || department.is_empty() {
            return Err(DeskError::validation(
                "certificate name and department are required",
            ));
        }

        self.seq += 1;
        let id = format!("ISO-{:04}", self.seq);
        let file_url = if cert.file_url.trim().is_empty() {
            format!("/certificates/{id}.pdf")
        } else {
            cert.file_url.trim().to_string()
        };

        self.certs.push(IsoCertificate {
            id,
            name: name.to_string(),
            department: department.to_string(),
            uploaded_by: actor.display_name(),
            upload_date: now,
            expiry_date: cert.expiry_date,
            file_url,
        });
        let idx = self.certs.len() - 1;
        Ok(&self.certs[idx])
    }

    pub fn info(&self, cert: &IsoCertificate, now: DateTime<Utc>) -> ExpiryInfo {
        expiry_info(cert.expiry_date, now, self.warning_days)
    }

    /// Certificates that need renewal attention, soonest first.
    pub fn renewal_alerts(&self, now: DateTime<Utc>) -> Vec<(&IsoCertificate, ExpiryInfo)> {
        let mut out: Vec<_> = self
            .certs
            .iter()
            .map(|c| (c, self.info(c, now)))
            .filter(|(_, i)| i.status != ExpiryStatus::Active)
            .collect();
        out.sort_by_key(|(c, _)| c.expiry_date);
        out
    }

    pub fn status_counts(&self, now: DateTime<Utc>) -> BTreeMap<ExpiryStatus, usize> {
        let mut counts = BTreeMap::new();
        for c in &self.certs {
            *counts.entry(self.info(c, now).status).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use envmon_schemas::UserRole;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn classification_boundaries() {
        let n = now();
        assert_eq!(
            expiry_info(n - Duration::hours(1), n, 90),
            ExpiryInfo { status: ExpiryStatus::Expired, days_left: 0 }
        );
        assert_eq!(expiry_info(n + Duration::days(90), n, 90).status, ExpiryStatus::Expiring);
        assert_eq!(expiry_info(n + Duration::days(91), n, 90).status, ExpiryStatus::Active);
        assert_eq!(
            expiry_info(n + Duration::hours(1), n, 90),
            ExpiryInfo { status: ExpiryStatus::Expiring, days_left: 0 }
        );
        assert_eq!(expiry_info(n, n, 90).days_left, 0);
    }

    #[test]
    fn partial_days_are_truncated_before_the_warning_check() {
        let n = now();
        let info = expiry_info(n + Duration::days(90) + Duration::hours(12), n, 90);
        assert_eq!(info, ExpiryInfo { status: ExpiryStatus::Expiring, days_left: 90 });
        let info = expiry_info(n + Duration::days(91) - Duration::seconds(1), n, 90);
        assert_eq!(info.days_left, 90);
        assert_eq!(expiry_info(n + Duration::days(91), n, 90).status, ExpiryStatus::Active);
    }

    #[test]
    fn upload_requires_permission() {
        let staff = User::with_role_defaults("u1", "John", "j@x", UserRole::ConcernStaff, "Mfg");
        let bo = User::with_role_defaults("u3", "Mike", "m@x", UserRole::Bo, "Mfg");
        let mut reg = CertificateRegister::default();
        let cert = NewCertificate {
            name: "ISO 14001:2015".into(),
            department: "Mfg".into(),
            expiry_date: now() + Duration::days(30),
            file_url: String::new(),
        };

        assert!(matches!(
            reg.upload(cert.clone(), &staff, now()),
            Err(DeskError::Access(_))
        ));
        let c = reg.upload(cert, &bo, now()).unwrap();
        assert_eq!(c.id, "ISO-0001");
        assert_eq!(c.uploaded_by, "Mike (BO)");
        assert_eq!(c.file_url, "/certificates/ISO-0001.pdf");
    }

    #[test]
    fn counts_and_alerts() {
        let wpo = User::with_role_defaults("u4", "Emily", "e@x", UserRole::Wpo, "All");
        let mut reg = CertificateRegister::new(60);
        for days in [-5, 30, 365] {
            reg.upload(
                NewCertificate {
                    name: format!("cert {days}"),
                    department: "Mfg".into(),
                    expiry_date: now() + Duration::days(days),
                    file_url: String::new(),
                },
                &wpo,
                now(),
            )
            .unwrap();
        }
        let counts = reg.status_counts(now());
        assert_eq!(counts[&ExpiryStatus::Expired], 1);
        assert_eq!(counts[&ExpiryStatus::Expiring], 1);
        assert_eq!(counts[&ExpiryStatus::Active], 1);

        let alerts = reg.renewal_alerts(now());
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].1.status, ExpiryStatus::Expired);
    }
}
