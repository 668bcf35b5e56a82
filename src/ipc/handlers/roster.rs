use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{assessment_out_of, course_names, db_conn, require_admin, required_str};
use crate::ipc::types::{AppState, Request};
use crate::{metrics, roster};
use serde_json::json;

/// Bulk upload for one batch: CSV text in, previous roster replaced.
fn handle_import_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    if let Err(e) = require_admin(conn, req) {
        return e;
    }
    let batch = match required_str(req, "batch") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if batch.is_empty() {
        return err(&req.id, "bad_params", "batch must not be empty", None);
    }
    let csv = match required_str(req, "csv") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let records = match roster::parse_roster_csv(&csv, &batch) {
        Ok(r) => r,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match roster::replace_batch(conn, &batch, &records) {
        Ok(count) => ok(&req.id, json!({ "batch": batch, "imported": count })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let batch = match required_str(req, "batch") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match roster::load_batch(conn, &batch) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Single-record lookup by registration number, trimmed and
/// case-insensitive. The reply carries the derived record so the detail
/// page gets its metric fields without a second round trip.
fn handle_students_find(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let batch = match required_str(req, "batch") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let reg_no = match required_str(req, "regNo") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let students = match roster::load_batch(conn, &batch) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(found) = metrics::find_student(&students, &reg_no) else {
        return err(
            &req.id,
            "not_found",
            "No student found with this registration number",
            None,
        );
    };

    let courses = match course_names(conn, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let derived = metrics::derive_record(found, &courses, assessment_out_of(conn));
    ok(&req.id, json!({ "student": derived }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.importCsv" => Some(handle_import_csv(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.find" => Some(handle_students_find(state, req)),
        _ => None,
    }
}
