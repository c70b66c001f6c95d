//! Statement rendering.
//!
//! Pure string builders for the RQL statement forms. WHERE fragments are
//! joined with ` AND `; an empty fragment list yields no WHERE clause.
//! Binary values are hex-encoded; numeric and string values are rendered
//! as literals by the caller.

/// The protocol reset statement.
pub const RESET: &str = "RESET";

/// Render a SELECT statement.
///
/// An empty field list is a programming-contract violation, not a runtime
/// error, and panics.
pub fn select(
    fields: &[&str],
    table: &str,
    where_clauses: &[String],
    timeout_ms: Option<u64>,
) -> String {
    assert!(!fields.is_empty(), "SELECT requires at least one field");

    let mut q = String::from("SELECT ");
    q.push_str(&fields.join(","));
    q.push_str(" FROM ");
    q.push_str(table);
    push_where(&mut q, where_clauses);
    if let Some(ms) = timeout_ms {
        q.push_str(&format!(" SET time_out={}", ms));
    }
    q
}

/// Render an UPDATE statement assigning one column.
pub fn update(
    table: &str,
    column: &str,
    value: &str,
    where_clauses: &[String],
    timeout_ms: Option<u64>,
) -> String {
    let mut q = format!("UPDATE {} SET {}={}", table, column, value);
    push_where(&mut q, where_clauses);
    if let Some(ms) = timeout_ms {
        q.push_str(&format!(" SET time_out={}", ms));
    }
    q
}

/// Render a cursor declaration over a SELECT statement.
pub fn declare_cursor(name: &str, select_query: &str) -> String {
    format!("DECLARE {} CURSOR FOR {}", name, select_query)
}

/// Render `SET AUTO <names>=ON` or the nameless `SET AUTO=OFF`.
pub fn set_auto(cursors: &[String], on: bool) -> String {
    if on {
        format!("SET AUTO {}=ON", cursors.join(","))
    } else {
        String::from("SET AUTO=OFF")
    }
}

/// Render the continuous-read repeat interval.
pub fn set_repeat(ms: u64) -> String {
    format!("SET repeat={}", ms)
}

/// Render a FETCH over declared cursors.
pub fn fetch(cursors: &[String]) -> String {
    format!("FETCH {}", cursors.join(","))
}

/// Hex-encode bytes as a `0x…` literal.
pub fn hex_literal(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(2 + bytes.len() * 2);
    s.push_str("0x");
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02X}", b);
    }
    s
}

fn push_where(q: &mut String, where_clauses: &[String]) {
    if !where_clauses.is_empty() {
        q.push_str(" WHERE ");
        q.push_str(&where_clauses.join(" AND "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_no_where() {
        let q = select(&["id", "antenna_id"], "tag_id", &[], None);
        assert_eq!(q, "SELECT id,antenna_id FROM tag_id");
    }

    #[test]
    fn test_select_where_and_timeout() {
        let q = select(
            &["id"],
            "tag_id",
            &["protocol_id='GEN2'".into(), "antenna_id=1".into()],
            Some(250),
        );
        assert_eq!(
            q,
            "SELECT id FROM tag_id WHERE protocol_id='GEN2' AND antenna_id=1 SET time_out=250"
        );
    }

    #[test]
    #[should_panic(expected = "at least one field")]
    fn test_select_empty_fields_panics() {
        select(&[], "tag_id", &[], None);
    }

    #[test]
    fn test_update() {
        let q = update("tag_id", "killed", "1", &["id=0xE200".into()], None);
        assert_eq!(q, "UPDATE tag_id SET killed=1 WHERE id=0xE200");
    }

    #[test]
    fn test_declare_and_auto() {
        let q = declare_cursor("mxcursor1", "SELECT id FROM tag_id");
        assert_eq!(q, "DECLARE mxcursor1 CURSOR FOR SELECT id FROM tag_id");

        let names = vec!["mxcursor1".to_string(), "mxcursor2".to_string()];
        assert_eq!(set_auto(&names, true), "SET AUTO mxcursor1,mxcursor2=ON");
        assert_eq!(set_auto(&[], false), "SET AUTO=OFF");
        assert_eq!(fetch(&names), "FETCH mxcursor1,mxcursor2");
    }

    #[test]
    fn test_hex_literal() {
        assert_eq!(hex_literal(&[0xE2, 0x00, 0xAB]), "0xE200AB");
        assert_eq!(hex_literal(&[]), "0x");
    }
}
