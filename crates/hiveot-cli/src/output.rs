//! Table formatting for CLI output

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use hiveot_kernel::CapabilityInfo;
use hiveot_runtime::transport::CertSummary;

use crate::commands::certs::CertEntry;

fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers);
    table
}

/// RFC 3339 time of a unix timestamp.
pub fn format_time(unix: i64) -> String {
    DateTime::<Utc>::from_timestamp(unix, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| unix.to_string())
}

pub fn cert_details(summary: &CertSummary) -> String {
    format!(
        "Subject:    {}\nIssuer:     {}\nSerial:     {}\nValid from: {}\nValid to:   {}",
        summary.subject,
        summary.issuer,
        summary.serial,
        format_time(summary.not_before),
        format_time(summary.not_after)
    )
}

pub fn cert_table(certs: &[CertEntry]) -> Table {
    let mut table = table(&["File", "Common name", "OU", "Expires"]);
    for cert in certs {
        let ou = if cert.summary.is_ca {
            "CA".to_string()
        } else {
            cert.summary.organizational_unit.clone().unwrap_or_default()
        };
        table.add_row(vec![
            cert.file.clone(),
            cert.summary.common_name.clone(),
            ou,
            format_time(cert.summary.not_after),
        ]);
    }
    table
}

pub fn capability_table(caps: &[CapabilityInfo]) -> Table {
    let mut table = table(&["Service", "Method", "Interface", "Roles"]);
    for cap in caps {
        let roles: Vec<&str> = cap.auth_types.iter().map(|a| a.as_str()).collect();
        table.add_row(vec![
            cap.service_id.clone(),
            cap.method_name.clone(),
            cap.interface_name.clone(),
            roles.join(", "),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_are_utc() {
        assert_eq!(format_time(0), "1970-01-01 00:00:00 UTC");
    }
}
