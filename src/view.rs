use crate::metrics::{self, StudentRecord, BATCH_KEY, OVERALL_PERCENTAGE_KEY, REG_NO_KEY};
use serde_json::Value;

/// Client-facing table state for one portal session. The roster and the
/// filter inputs live here; everything displayed is re-derived from them
/// on read, so column sets and metrics can never go stale against the
/// current course list.
#[derive(Debug, Default)]
pub struct TableView {
    /// Batch tab the user currently has selected.
    pub active_batch: String,
    /// Bumped on every tab change; load tickets carry the value they were
    /// issued under and are discarded when it no longer matches.
    pub generation: u64,
    /// Batch whose roster is currently applied (lags active_batch while a
    /// load is in flight).
    pub loaded_batch: Option<String>,
    pub roster: Vec<StudentRecord>,
    pub search: String,
    pub selected_course: String,
    pub percentage_range: String,
}

impl TableView {
    /// Switches the active tab and invalidates any outstanding load.
    pub fn select_batch(&mut self, batch: &str) -> u64 {
        self.active_batch = batch.to_string();
        self.generation += 1;
        self.generation
    }

    /// Applies a fetched roster, unless the tab changed since the ticket
    /// was issued. A stale result must not overwrite the displayed data.
    pub fn apply_roster(
        &mut self,
        generation: u64,
        batch: &str,
        roster: Vec<StudentRecord>,
    ) -> bool {
        if generation != self.generation {
            return false;
        }
        self.loaded_batch = Some(batch.to_string());
        self.roster = roster;
        true
    }
}

/// Three-step row filter, always applied to the complete roster so the
/// inputs stay independent: reg-no substring, course selection (narrows
/// columns only, never rows), percentage bucket.
pub fn filter_rows(
    derived: &[StudentRecord],
    search: &str,
    selected_course: &str,
    percentage_range: &str,
) -> Vec<StudentRecord> {
    let needle = search.trim().to_lowercase();
    let bucket = parse_percent_range(percentage_range);
    let percent_key = if selected_course.is_empty() {
        OVERALL_PERCENTAGE_KEY.to_string()
    } else {
        format!("{} Percentage", selected_course)
    };

    derived
        .iter()
        .filter(|r| {
            if !needle.is_empty() && !metrics::reg_no(r).to_lowercase().contains(&needle) {
                return false;
            }
            if let Some((min, max)) = bucket {
                let value = percent_value(r, &percent_key);
                if value < min || value > max {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect()
}

/// Parses a "min-max" bucket. Anything that does not read as two numbers
/// disables the bucket rather than erroring.
pub fn parse_percent_range(range: &str) -> Option<(f64, f64)> {
    let t = range.trim();
    if t.is_empty() {
        return None;
    }
    let (lo, hi) = t.split_once('-')?;
    let min = lo.trim().parse::<f64>().ok()?;
    let max = hi.trim().parse::<f64>().ok()?;
    Some((min, max))
}

/// Reads a percentage field for bucket comparison; rows lacking it
/// compare as 0.
fn percent_value(record: &StudentRecord, key: &str) -> f64 {
    record
        .get(key)
        .and_then(metrics::coerce_score)
        .unwrap_or(0.0)
}

/// Plans the ordered, deduplicated column list for the current filter
/// state. Columns are derived from observed keys, never hand-maintained:
/// a course contributes nothing at all (metric columns included) if no
/// filtered row carries any of its assessment fields.
pub fn plan_columns(
    filtered: &[StudentRecord],
    courses: &[String],
    selected_course: &str,
) -> Vec<String> {
    let mut columns: Vec<String> = vec![REG_NO_KEY.to_string(), BATCH_KEY.to_string()];

    if !selected_course.is_empty() {
        columns.extend(observed_assessment_columns(filtered, selected_course));
        columns.push(format!("{} Total", selected_course));
        columns.push(format!("{} Average", selected_course));
        columns.push(format!("{} Percentage", selected_course));
        return columns;
    }

    for course in courses {
        let observed = observed_assessment_columns(filtered, course);
        if observed.is_empty() {
            continue;
        }
        columns.extend(observed);
        columns.push(format!("{} Total", course));
        columns.push(format!("{} Average", course));
        columns.push(format!("{} Percentage", course));
    }
    columns.push(OVERALL_PERCENTAGE_KEY.to_string());
    columns
}

/// Assessment column names for one course observed across the filtered
/// set, deduplicated in encounter order, then stably sorted by the
/// numeric suffix (all non-digits stripped; ties keep encounter order).
fn observed_assessment_columns(filtered: &[StudentRecord], course: &str) -> Vec<String> {
    let prefix = format!("{} assessment", course.to_lowercase());
    let mut observed: Vec<String> = Vec::new();
    for record in filtered {
        for key in record.keys() {
            if key.to_lowercase().starts_with(&prefix) && !observed.iter().any(|c| c == key) {
                observed.push(key.clone());
            }
        }
    }
    observed.sort_by_key(|name| assessment_index(name));
    observed
}

fn assessment_index(name: &str) -> u64 {
    let digits: String = name.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Serializes the filtered rows under the planned columns. Percentage
/// columns render with a trailing '%', missing values as '-'. Values are
/// emitted verbatim with no quoting, matching the original export; the
/// CSV importer, not this exporter, understands quoted fields.
pub fn export_csv(columns: &[String], rows: &[StudentRecord]) -> String {
    let mut out = String::new();
    out.push_str(&columns.join(","));
    out.push('\n');
    for row in rows {
        let line: Vec<String> = columns
            .iter()
            .map(|col| {
                let cell = match row.get(col) {
                    None | Some(Value::Null) => "-".to_string(),
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::Bool(b)) => b.to_string(),
                    Some(other) => other.to_string(),
                };
                if cell != "-" && col.contains("Percentage") {
                    format!("{}%", cell)
                } else {
                    cell
                }
            })
            .collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

/// Download name for an export: "{batch}_Students.csv", spaces
/// underscored.
pub fn csv_filename(batch: &str) -> String {
    format!("{}_Students.csv", batch.replace(' ', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn record(pairs: &[(&str, Value)]) -> StudentRecord {
        let mut m = Map::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v.clone());
        }
        m
    }

    fn courses(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn planner_skips_course_with_no_observed_fields() {
        let rows = vec![record(&[
            ("Reg No", json!("R1")),
            ("Batch", json!("2023-2027")),
            ("C Assessment 1", json!(8)),
        ])];
        let cols = plan_columns(&rows, &courses(&["C", "D"]), "");
        assert_eq!(
            cols,
            vec![
                "Reg No",
                "Batch",
                "C Assessment 1",
                "C Total",
                "C Average",
                "C Percentage",
                "Overall Percentage"
            ]
        );
    }

    #[test]
    fn planner_sorts_by_numeric_suffix() {
        let rows = vec![
            record(&[("Reg No", json!("R1")), ("C Assessment 10", json!(1))]),
            record(&[
                ("Reg No", json!("R2")),
                ("C Assessment 2", json!(2)),
                ("C Assessment 1", json!(3)),
            ]),
        ];
        let cols = plan_columns(&rows, &courses(&["C"]), "C");
        assert_eq!(
            cols,
            vec![
                "Reg No",
                "Batch",
                "C Assessment 1",
                "C Assessment 2",
                "C Assessment 10",
                "C Total",
                "C Average",
                "C Percentage"
            ]
        );
    }

    #[test]
    fn selected_course_keeps_all_rows() {
        let rows = vec![
            record(&[("Reg No", json!("R1")), ("C Assessment 1", json!(8))]),
            record(&[("Reg No", json!("R2"))]),
        ];
        let filtered = filter_rows(&rows, "", "C", "");
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn search_is_substring_case_insensitive() {
        let rows = vec![
            record(&[("Reg No", json!("21BCE100"))]),
            record(&[("Reg No", json!("21ECE200"))]),
        ];
        let filtered = filter_rows(&rows, "bce", "", "");
        assert_eq!(filtered.len(), 1);
        assert_eq!(metrics::reg_no(&filtered[0]), "21BCE100");
    }

    #[test]
    fn bucket_is_inclusive_on_both_ends() {
        let rows = vec![
            record(&[("Reg No", json!("R1")), ("Overall Percentage", json!("85.00"))]),
            record(&[("Reg No", json!("R2")), ("Overall Percentage", json!("79.99"))]),
            record(&[("Reg No", json!("R3"))]),
        ];
        let filtered = filter_rows(&rows, "", "", "80-90");
        assert_eq!(filtered.len(), 1);
        assert_eq!(metrics::reg_no(&filtered[0]), "R1");

        // Rows lacking the field compare as 0.
        let low = filter_rows(&rows, "", "", "0-10");
        assert_eq!(low.len(), 1);
        assert_eq!(metrics::reg_no(&low[0]), "R3");
    }

    #[test]
    fn malformed_bucket_disables_the_filter() {
        assert_eq!(parse_percent_range("80-90"), Some((80.0, 90.0)));
        assert_eq!(parse_percent_range(" 80 - 90 "), Some((80.0, 90.0)));
        assert_eq!(parse_percent_range(""), None);
        assert_eq!(parse_percent_range("all"), None);
        assert_eq!(parse_percent_range("80"), None);
    }

    #[test]
    fn csv_exact_bytes() {
        let cols = vec!["Reg No".to_string(), "Batch".to_string()];
        let rows = vec![record(&[
            ("Reg No", json!("R1")),
            ("Batch", json!("2023-2027")),
        ])];
        assert_eq!(export_csv(&cols, &rows), "Reg No,Batch\nR1,2023-2027\n");
    }

    #[test]
    fn csv_percentage_suffix_and_missing_dash() {
        let cols = vec![
            "Reg No".to_string(),
            "C Total".to_string(),
            "C Percentage".to_string(),
        ];
        let rows = vec![
            record(&[
                ("Reg No", json!("R1")),
                ("C Total", json!(14)),
                ("C Percentage", json!("70.00")),
            ]),
            record(&[("Reg No", json!("R2"))]),
        ];
        assert_eq!(
            export_csv(&cols, &rows),
            "Reg No,C Total,C Percentage\nR1,14,70.00%\nR2,-,-\n"
        );
    }

    #[test]
    fn filename_underscores_spaces() {
        assert_eq!(csv_filename("2023-2027"), "2023-2027_Students.csv");
        assert_eq!(csv_filename("batch of 2027"), "batch_of_2027_Students.csv");
    }

    #[test]
    fn stale_roster_application_is_discarded() {
        let mut view = TableView::default();
        let stale = view.select_batch("2023-2027");
        let current = view.select_batch("2022-2026");

        let applied = view.apply_roster(
            current,
            "2022-2026",
            vec![record(&[("Reg No", json!("B1"))])],
        );
        assert!(applied);

        let stale_applied = view.apply_roster(
            stale,
            "2023-2027",
            vec![record(&[("Reg No", json!("A1"))])],
        );
        assert!(!stale_applied);
        assert_eq!(view.loaded_batch.as_deref(), Some("2022-2026"));
        assert_eq!(metrics::reg_no(&view.roster[0]), "B1");
    }
}
