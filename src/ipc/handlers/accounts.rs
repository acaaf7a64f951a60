use crate::auth;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_err, get_required_str, require_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn register(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;

    let username = get_required_str(params, "username")?.trim().to_string();
    let password = get_required_str(params, "password")?.trim().to_string();
    let confirm = get_required_str(params, "confirmPassword")?.trim().to_string();

    if username.is_empty() || password.is_empty() || confirm.is_empty() {
        return Err(HandlerErr::new("bad_params", "all fields are required"));
    }
    if password != confirm {
        return Err(HandlerErr::new("bad_params", "passwords do not match"));
    }

    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE username = ?", [&username], |r| {
            r.get(0)
        })
        .optional()
        .map_err(db_err("db_query_failed"))?;
    if taken.is_some() {
        return Err(HandlerErr::new("username_taken", "username already taken"));
    }

    let user_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, username, password_hash) VALUES(?, ?, ?)",
        (&user_id, &username, auth::hash_password(&password)),
    )
    .map_err(db_err("db_insert_failed"))?;

    Ok(json!({ "userId": user_id, "username": username }))
}

fn login(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;

    let username = get_required_str(params, "username")?.trim().to_string();
    let password = get_required_str(params, "password")?.trim().to_string();

    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE username = ?",
            [&username],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(db_err("db_query_failed"))?;

    // One error for both unknown username and wrong password.
    let bad = || HandlerErr::new("invalid_credentials", "invalid username or password");
    let (user_id, stored_hash) = row.ok_or_else(bad)?;
    if !auth::verify_password(&stored_hash, &password) {
        return Err(bad());
    }

    Ok(json!({ "userId": user_id, "username": username }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "account.register" => register(state, &req.params),
        "account.login" => login(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
