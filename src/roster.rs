use crate::metrics::{StudentRecord, BATCH_KEY, REG_NO_KEY};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Splits one CSV line, honoring double-quoted fields with embedded
/// commas and doubled quotes. Uploaded sheets use quoting even though
/// the portal's own export does not.
pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

/// Parses an uploaded roster sheet into open records. The first line is
/// the header and must carry a "Reg No" column; every other column name
/// is taken as-is, so new "<Course> Assessment <N>" columns flow through
/// without any code change. Numeric-looking cells become numbers, blanks
/// are dropped, the "-" placeholder is kept as a string.
pub fn parse_roster_csv(text: &str, batch: &str) -> Result<Vec<StudentRecord>, String> {
    let mut lines = text.lines();
    let Some(header_line) = lines.next() else {
        return Err("empty csv".to_string());
    };
    let header: Vec<String> = parse_csv_record(header_line)
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    if !header.iter().any(|h| h.eq_ignore_ascii_case(REG_NO_KEY)) {
        return Err("header must contain a Reg No column".to_string());
    }

    let mut records = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let cells = parse_csv_record(line);
        let mut record: StudentRecord = Map::new();
        for (idx, name) in header.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            let Some(cell) = cells.get(idx) else {
                continue;
            };
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            if name.eq_ignore_ascii_case(REG_NO_KEY) {
                // Registration numbers are identifiers, never numbers.
                record.insert(REG_NO_KEY.to_string(), Value::String(cell.to_string()));
            } else {
                record.insert(name.clone(), cell_value(cell));
            }
        }
        if record.get(REG_NO_KEY).and_then(|v| v.as_str()).is_none() {
            continue;
        }
        // The upload sheet may omit Batch; fall back to the target tab.
        record
            .entry(BATCH_KEY.to_string())
            .or_insert_with(|| Value::String(batch.to_string()));
        records.push(record);
    }
    Ok(records)
}

fn cell_value(cell: &str) -> Value {
    if cell == "-" {
        return Value::String(cell.to_string());
    }
    if let Ok(n) = cell.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = cell.parse::<f64>() {
        return Value::from(f);
    }
    Value::String(cell.to_string())
}

/// Replaces a batch's roster wholesale, matching the upload route's
/// overwrite semantics. Returns the stored row count.
pub fn replace_batch(
    conn: &Connection,
    batch: &str,
    records: &[StudentRecord],
) -> anyhow::Result<usize> {
    let now = Utc::now().to_rfc3339();
    conn.execute("DELETE FROM students WHERE batch = ?", [batch])?;
    for (i, record) in records.iter().enumerate() {
        let reg_no = record
            .get(REG_NO_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or("");
        conn.execute(
            "INSERT INTO students(id, batch, reg_no, fields, sort_order, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                batch,
                reg_no,
                serde_json::to_string(record)?,
                i as i64,
                &now,
            ),
        )?;
    }
    Ok(records.len())
}

/// Loads a batch's roster in upload order.
pub fn load_batch(conn: &Connection, batch: &str) -> anyhow::Result<Vec<StudentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT fields FROM students WHERE batch = ? ORDER BY sort_order",
    )?;
    let raws = stmt
        .query_map([batch], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(raws.len());
    for raw in raws {
        let record: StudentRecord = serde_json::from_str(&raw)?;
        out.push(record);
    }
    Ok(out)
}
