use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{assessment_out_of, course_names, db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::metrics::StudentRecord;
use crate::{metrics, roster, view};
use serde_json::json;

/// Derive -> filter -> plan, from the raw roster and the current course
/// list on every call. Nothing here is cached, so a course added or
/// deleted between calls is reflected immediately.
fn project_table(
    state: &AppState,
    courses: &[String],
    out_of: f64,
) -> (Vec<StudentRecord>, Vec<String>) {
    let derived: Vec<StudentRecord> = state
        .view
        .roster
        .iter()
        .map(|r| metrics::derive_record(r, courses, out_of))
        .collect();
    let filtered = view::filter_rows(
        &derived,
        &state.view.search,
        &state.view.selected_course,
        &state.view.percentage_range,
    );
    let columns = view::plan_columns(&filtered, courses, &state.view.selected_course);
    (filtered, columns)
}

fn handle_select_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let batch = match required_str(req, "batch") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let generation = state.view.select_batch(&batch);
    ok(
        &req.id,
        json!({ "ticket": { "batch": batch, "generation": generation } }),
    )
}

/// Second phase of a tab switch: read the batch's roster and apply it,
/// unless a newer selectBatch has superseded the ticket. Stale results
/// are discarded so they cannot overwrite the displayed tab's data.
fn handle_complete_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ticket = req.params.get("ticket").cloned().unwrap_or_default();
    let Some(batch) = ticket.get("batch").and_then(|v| v.as_str()).map(String::from) else {
        return err(&req.id, "bad_params", "missing ticket.batch", None);
    };
    let Some(generation) = ticket.get("generation").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing ticket.generation", None);
    };

    let students = {
        let conn = match db_conn(state, req) {
            Ok(c) => c,
            Err(e) => return e,
        };
        match roster::load_batch(conn, &batch) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    let count = students.len();
    let applied = state.view.apply_roster(generation, &batch, students);
    ok(&req.id, json!({ "applied": applied, "count": count }))
}

fn handle_set_filters(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(s) = req.params.get("search").and_then(|v| v.as_str()) {
        state.view.search = s.to_string();
    }
    if let Some(c) = req.params.get("course").and_then(|v| v.as_str()) {
        state.view.selected_course = c.to_string();
    }
    if let Some(r) = req.params.get("percentageRange").and_then(|v| v.as_str()) {
        state.view.percentage_range = r.to_string();
    }
    ok(
        &req.id,
        json!({
            "search": state.view.search,
            "course": state.view.selected_course,
            "percentageRange": state.view.percentage_range,
        }),
    )
}

fn handle_table(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (courses, out_of) = {
        let conn = match db_conn(state, req) {
            Ok(c) => c,
            Err(e) => return e,
        };
        let courses = match course_names(conn, req) {
            Ok(c) => c,
            Err(e) => return e,
        };
        (courses, assessment_out_of(conn))
    };

    let (rows, columns) = project_table(state, &courses, out_of);
    ok(
        &req.id,
        json!({
            "batch": state.view.active_batch,
            "loadedBatch": state.view.loaded_batch,
            "columns": columns,
            "count": rows.len(),
            "rows": rows,
        }),
    )
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (courses, out_of) = {
        let conn = match db_conn(state, req) {
            Ok(c) => c,
            Err(e) => return e,
        };
        let courses = match course_names(conn, req) {
            Ok(c) => c,
            Err(e) => return e,
        };
        (courses, assessment_out_of(conn))
    };

    let (rows, columns) = project_table(state, &courses, out_of);
    if rows.is_empty() {
        return err(&req.id, "empty_roster", "no rows to export", None);
    }
    let csv = view::export_csv(&columns, &rows);
    ok(
        &req.id,
        json!({
            "filename": view::csv_filename(&state.view.active_batch),
            "csv": csv,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "view.selectBatch" => Some(handle_select_batch(state, req)),
        "view.completeLoad" => Some(handle_complete_load(state, req)),
        "view.setFilters" => Some(handle_set_filters(state, req)),
        "view.table" => Some(handle_table(state, req)),
        "view.exportCsv" => Some(handle_export_csv(state, req)),
        _ => None,
    }
}
