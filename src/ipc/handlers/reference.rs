use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, require_admin, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn courses_json(conn: &Connection) -> rusqlite::Result<serde_json::Value> {
    let mut stmt =
        conn.prepare("SELECT id, coursename FROM courses ORDER BY sort_order")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "coursename": r.get::<_, String>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!(rows))
}

fn years_json(conn: &Connection) -> rusqlite::Result<serde_json::Value> {
    let mut stmt = conn.prepare("SELECT id, year FROM years ORDER BY year")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "year": r.get::<_, String>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!(rows))
}

/// Both lists in one reply; the client fetches this once at mount and
/// after every mutation.
fn handle_reference_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let courses = match courses_json(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let years = match years_json(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "courses": courses, "years": years }))
}

fn handle_course_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    if let Err(e) = require_admin(conn, req) {
        return e;
    }
    let name = match required_str(req, "coursename") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "coursename must not be empty", None);
    }

    let next_order: i64 = match conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM courses",
        [],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT OR IGNORE INTO courses(id, coursename, sort_order) VALUES(?, ?, ?)",
        (&id, &name, next_order),
    ) {
        Ok(0) => return err(
            &req.id,
            "duplicate",
            format!("course already exists: {}", name),
            None,
        ),
        Ok(_) => {}
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    }

    match courses_json(conn) {
        Ok(courses) => ok(
            &req.id,
            json!({ "id": id, "coursename": name, "courses": courses }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_course_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    if let Err(e) = require_admin(conn, req) {
        return e;
    }
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let removed = match conn.execute("DELETE FROM courses WHERE id = ?", [&id]) {
        Ok(n) => n > 0,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    match courses_json(conn) {
        Ok(courses) => ok(&req.id, json!({ "removed": removed, "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_year_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    if let Err(e) = require_admin(conn, req) {
        return e;
    }
    let year = match required_str(req, "year") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if year.is_empty() {
        return err(&req.id, "bad_params", "year must not be empty", None);
    }
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT OR IGNORE INTO years(id, year) VALUES(?, ?)",
        (&id, &year),
    ) {
        Ok(0) => return err(
            &req.id,
            "duplicate",
            format!("year already exists: {}", year),
            None,
        ),
        Ok(_) => {}
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    }
    match years_json(conn) {
        Ok(years) => ok(&req.id, json!({ "id": id, "year": year, "years": years })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_year_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    if let Err(e) = require_admin(conn, req) {
        return e;
    }
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let removed = match conn.execute("DELETE FROM years WHERE id = ?", [&id]) {
        Ok(n) => n > 0,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    match years_json(conn) {
        Ok(years) => ok(&req.id, json!({ "removed": removed, "years": years })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reference.get" => Some(handle_reference_get(state, req)),
        "course.add" => Some(handle_course_add(state, req)),
        "course.delete" => Some(handle_course_delete(state, req)),
        "year.add" => Some(handle_year_add(state, req)),
        "year.delete" => Some(handle_year_delete(state, req)),
        _ => None,
    }
}
