use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_err, get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::Connection;
use serde_json::json;

/// Settings are returned without the stored password.
fn public_settings(settings: &store::AdminSettings) -> serde_json::Value {
    json!({
        "username": settings.username,
        "appName": settings.app_name,
        "appLogo": settings.app_logo,
        "updatedAt": settings.updated_at,
    })
}

/// The gate is the password; username is checked only when the client sends
/// one.
fn admin_login(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let password = get_required_str(params, "password")?;

    let settings = store::get_or_create_admin_settings(conn).map_err(db_err("db_query_failed"))?;
    if let Some(username) = get_opt_str(params, "username") {
        if username != settings.username {
            return Err(HandlerErr::new("unauthorized", "invalid credentials"));
        }
    }
    if password != settings.password {
        return Err(HandlerErr::new("unauthorized", "invalid credentials"));
    }
    Ok(json!({
        "success": true,
        "settings": public_settings(&settings),
    }))
}

fn admin_get_settings(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let settings = store::get_or_create_admin_settings(conn).map_err(db_err("db_query_failed"))?;
    Ok(json!({ "settings": public_settings(&settings) }))
}

/// Any change to credentials or branding requires the current password.
fn admin_update_settings(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let current_password = get_required_str(params, "currentPassword")?;
    let settings = store::get_or_create_admin_settings(conn).map_err(db_err("db_query_failed"))?;
    if current_password != settings.password {
        return Err(HandlerErr::new("unauthorized", "invalid credentials"));
    }

    let username = get_opt_str(params, "username")
        .map(|u| u.trim().to_string())
        .unwrap_or(settings.username);
    if username.is_empty() {
        return Err(HandlerErr::bad_params("username must not be empty"));
    }
    let password = match get_opt_str(params, "password") {
        Some(p) if !p.is_empty() => p,
        Some(_) => return Err(HandlerErr::bad_params("password must not be empty")),
        None => settings.password,
    };
    let app_name = get_opt_str(params, "appName").unwrap_or(settings.app_name);
    let app_logo = match params.get("appLogo") {
        Some(v) if v.is_null() => None,
        Some(v) => v.as_str().map(|s| s.to_string()),
        None => settings.app_logo,
    };

    conn.execute(
        "UPDATE admin_settings SET username = ?, password = ?, app_name = ?, app_logo = ?,
                updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            username,
            password,
            app_name,
            app_logo,
            store::now_iso(),
            settings.id
        ],
    )
    .map_err(db_err("db_update_failed"))?;

    let updated = store::get_or_create_admin_settings(conn).map_err(db_err("db_query_failed"))?;
    Ok(json!({ "settings": public_settings(&updated) }))
}

fn dispatch(
    state: &mut AppState,
    req: &Request,
    f: impl Fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admin.login" => Some(dispatch(state, req, admin_login)),
        "admin.getSettings" => Some(dispatch(state, req, |c, _| admin_get_settings(c))),
        "admin.updateSettings" => Some(dispatch(state, req, admin_update_settings)),
        _ => None,
    }
}
