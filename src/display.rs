//! Display formatting for the endpoint directory
//!
//! SBIO pattern: pure functions that return formatted strings

use crate::discovery::{deduplicate, AllocationSnapshot, Endpoint};

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No entries found.\n".to_string();
    }

    // Calculate column widths
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();

    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            output.push_str("   ");
        }
        output.push_str(&format!(
            "{:width$}",
            header.to_uppercase(),
            width = widths[i]
        ));
    }
    output.push('\n');

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                output.push_str("   ");
            }
            if i < widths.len() {
                output.push_str(&format!("{:width$}", cell, width = widths[i]));
            } else {
                output.push_str(cell);
            }
        }
        output.push('\n');
    }

    output
}

/// Two-column table of endpoints, sorted by service key
pub fn format_endpoints(key_header: &str, value_header: &str, endpoints: &[Endpoint]) -> String {
    let mut sorted: Vec<&Endpoint> = endpoints.iter().collect();
    sorted.sort_by(|a, b| a.service.cmp(&b.service));

    let rows = sorted
        .into_iter()
        .map(|e| vec![e.service.clone(), e.url.clone()])
        .collect();

    format_table(&[key_header, value_header], rows)
}

/// The three live buckets of one extraction call, each reduced to the
/// entries the directory keeps
pub fn format_snapshot(snapshot: &AllocationSnapshot) -> String {
    let section = |key_header: &str, bucket: &[Endpoint]| {
        let unique = deduplicate(bucket.iter().cloned());
        format_endpoints(key_header, "Port", &unique)
    };

    let urls = deduplicate(snapshot.service_urls().iter().cloned());

    let mut output = String::new();
    output.push_str(&format_endpoints("Service", "URL", &urls));
    output.push('\n');
    output.push_str(&section("Host Reserved Ports", snapshot.host_reserved_ports()));
    output.push('\n');
    output.push_str(&section("Service Ports", snapshot.service_ports()));
    output
}
