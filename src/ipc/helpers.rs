use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Admin gate for mutating methods: the caller must present a token
/// issued by auth.login.
pub fn require_admin(conn: &Connection, req: &Request) -> Result<String, serde_json::Value> {
    let token = required_str(req, "token")?;
    let username: Option<String> = conn
        .query_row(
            "SELECT username FROM sessions WHERE token = ?",
            [&token],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    username.ok_or_else(|| err(&req.id, "unauthorized", "admin login required", None))
}

/// Configured course names in admin-entered order.
pub fn course_names(conn: &Connection, req: &Request) -> Result<Vec<String>, serde_json::Value> {
    let mut stmt = conn
        .prepare("SELECT coursename FROM courses ORDER BY sort_order")
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    stmt.query_map([], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

/// The configured per-assessment ceiling, falling back to the default
/// when the setting is absent or unreadable.
pub fn assessment_out_of(conn: &Connection) -> f64 {
    crate::db::settings_get_json(conn, "portal.table")
        .ok()
        .flatten()
        .and_then(|v| v.get("assessmentOutOf").and_then(|n| n.as_f64()))
        .filter(|v| *v > 0.0)
        .unwrap_or(crate::metrics::DEFAULT_OUT_OF)
}
