use serde_json::{Map, Value};

/// A roster row as uploaded: an open mapping from field name to value.
/// Mandatory keys are "Reg No" and "Batch"; any number of
/// "<Course> Assessment <N>" fields may be present per course.
pub type StudentRecord = Map<String, Value>;

pub const REG_NO_KEY: &str = "Reg No";
pub const BATCH_KEY: &str = "Batch";
pub const OVERALL_PERCENTAGE_KEY: &str = "Overall Percentage";

/// Default score ceiling per assessment. Overridable through the
/// portal.table setting; the original hard-coded it.
pub const DEFAULT_OUT_OF: f64 = 10.0;

/// Per-course running tally, kept raw so the overall percentage can be
/// aggregated across courses without averaging averages.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CourseTally {
    pub sum: f64,
    pub count: usize,
}

impl CourseTally {
    pub fn total(&self) -> f64 {
        self.sum
    }

    pub fn average(&self) -> String {
        if self.count == 0 {
            "0.00".to_string()
        } else {
            fmt2(self.sum / self.count as f64)
        }
    }

    pub fn percentage(&self, out_of: f64) -> String {
        let denom = self.count as f64 * out_of;
        if denom <= 0.0 {
            "0.00".to_string()
        } else {
            fmt2(self.sum / denom * 100.0)
        }
    }
}

pub fn fmt2(v: f64) -> String {
    format!("{:.2}", v)
}

/// Lenient score coercion. Numbers pass through; strings get a
/// parseFloat-style prefix parse with "-" and "" counting as zero;
/// everything that cannot be read as a number is excluded entirely,
/// which shrinks the average's denominator rather than dragging it down.
/// Malformed data never raises an error.
pub fn coerce_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() || t == "-" {
                return Some(0.0);
            }
            parse_float_prefix(t)
        }
        _ => None,
    }
}

/// Longest-numeric-prefix parse: "7.5" -> 7.5, "7.5pts" -> 7.5,
/// "abc" -> None. Mirrors how the original read spreadsheet cells.
fn parse_float_prefix(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = 0usize;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let mut seen_digit = false;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {
                seen_digit = true;
                end += 1;
            }
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    if !seen_digit {
        return None;
    }
    s[..end].parse::<f64>().ok()
}

/// Collects the tally for one course: every field whose lowercase name
/// starts with "<course> assessment" contributes its coerced score.
pub fn course_tally(record: &StudentRecord, course: &str) -> CourseTally {
    let prefix = format!("{} assessment", course.to_lowercase());
    let mut tally = CourseTally::default();
    for (key, value) in record {
        if !key.to_lowercase().starts_with(&prefix) {
            continue;
        }
        if let Some(score) = coerce_score(value) {
            tally.sum += score;
            tally.count += 1;
        }
    }
    tally
}

/// Augments a record with "<Course> Total/Average/Percentage" for every
/// configured course (always present, zero-valued when the course has no
/// fields on this record) plus a single "Overall Percentage". The input
/// record is not mutated; metrics are derived fresh on every call so a
/// course-list change can never see a stale value.
pub fn derive_record(record: &StudentRecord, courses: &[String], out_of: f64) -> StudentRecord {
    let mut out = record.clone();
    let mut overall = CourseTally::default();
    for course in courses {
        let tally = course_tally(record, course);
        overall.sum += tally.sum;
        overall.count += tally.count;
        out.insert(format!("{} Total", course), json_number(tally.total()));
        out.insert(
            format!("{} Average", course),
            Value::String(tally.average()),
        );
        out.insert(
            format!("{} Percentage", course),
            Value::String(tally.percentage(out_of)),
        );
    }
    out.insert(
        OVERALL_PERCENTAGE_KEY.to_string(),
        Value::String(overall.percentage(out_of)),
    );
    out
}

fn json_number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Value::from(v as i64)
    } else {
        Value::from(v)
    }
}

pub fn reg_no(record: &StudentRecord) -> &str {
    record
        .get(REG_NO_KEY)
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

/// Exact-match lookup by registration number: trimmed, case-insensitive.
/// First match wins if the roster ever carries duplicates.
pub fn find_student<'a>(
    roster: &'a [StudentRecord],
    query: &str,
) -> Option<&'a StudentRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    roster
        .iter()
        .find(|r| reg_no(r).trim().to_lowercase() == needle)
}
