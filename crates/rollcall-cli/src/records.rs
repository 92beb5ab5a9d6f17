//! Printing attendance records.

use rollcall_store::AttendanceRecord;

/// Plain-text table with a header row, columns padded to the widest cell.
pub fn render_table(records: &[AttendanceRecord]) -> String {
    if records.is_empty() {
        return "No attendance records.\n".to_string();
    }

    let name_width = records.iter().map(|r| r.name.chars().count()).max().unwrap_or(0).max(4);
    let date_width = records.iter().map(|r| r.date.len()).max().unwrap_or(0).max(4);

    let mut out = format!("{:<name_width$}  {:<date_width$}  TIMESTAMP\n", "NAME", "DATE");
    for r in records {
        out.push_str(&format!("{:<name_width$}  {:<date_width$}  {}\n", r.name, r.date, r.timestamp));
    }
    out
}

pub fn render_json(records: &[AttendanceRecord]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, ts: &str) -> AttendanceRecord {
        AttendanceRecord { name: name.into(), date: ts[..10].into(), timestamp: ts.into() }
    }

    #[test]
    fn test_table_aligns_columns() {
        let table = render_table(&[
            record("Al", "2024-09-03 08:00:00"),
            record("Bartholomew", "2024-09-03 08:05:10"),
        ]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME         DATE"));
        assert_eq!(lines[1], "Al           2024-09-03  2024-09-03 08:00:00");
        assert_eq!(lines[2], "Bartholomew  2024-09-03  2024-09-03 08:05:10");
    }

    #[test]
    fn test_table_empty() {
        assert_eq!(render_table(&[]), "No attendance records.\n");
    }

    #[test]
    fn test_json_fields() {
        let json = render_json(&[record("Alice", "2024-09-03 08:00:00")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["name"], "Alice");
        assert_eq!(value[0]["date"], "2024-09-03");
        assert_eq!(value[0]["timestamp"], "2024-09-03 08:00:00");
    }
}
