use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn handle_signup(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let username = match required_str(req, "username") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if username.is_empty() || password.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "username and password must not be empty",
            None,
        );
    }

    let salt = Uuid::new_v4().to_string();
    let digest = digest_password(&salt, &password);
    let id = Uuid::new_v4().to_string();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO admins(id, username, password_sha256, salt)
         VALUES(?, ?, ?, ?)",
        (&id, &username, &digest, &salt),
    );
    match inserted {
        Ok(0) => err(
            &req.id,
            "duplicate",
            format!("admin already exists: {}", username),
            None,
        ),
        Ok(_) => ok(&req.id, json!({ "id": id, "username": username })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let username = match required_str(req, "username") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let row: Option<(String, String)> = match conn
        .query_row(
            "SELECT password_sha256, salt FROM admins WHERE username = ?",
            [&username],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // One generic message for unknown user and wrong password alike.
    let Some((stored, salt)) = row else {
        return err(&req.id, "invalid_credentials", "Invalid credentials", None);
    };
    if digest_password(&salt, &password) != stored {
        return err(&req.id, "invalid_credentials", "Invalid credentials", None);
    }

    let token = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO sessions(token, username, created_at) VALUES(?, ?, ?)",
        (&token, &username, Utc::now().to_rfc3339()),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "token": token, "role": "admin" }))
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let token = match required_str(req, "token") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.execute("DELETE FROM sessions WHERE token = ?", [&token]) {
        Ok(n) => ok(&req.id, json!({ "removed": n > 0 })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.signup" => Some(handle_signup(state, req)),
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        _ => None,
    }
}
