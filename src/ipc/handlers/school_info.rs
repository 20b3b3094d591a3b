use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_err, get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::receipt;
use crate::store;
use rusqlite::Connection;
use serde_json::json;

fn school_info_get(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let info = store::get_school_info(conn)
        .map_err(db_err("db_query_failed"))?
        .unwrap_or_else(receipt::default_school_info);
    Ok(json!({ "schoolInfo": info }))
}

/// Upserts the singleton school profile row.
fn school_info_set(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let address = get_opt_str(params, "address").unwrap_or_default();
    let phone = get_opt_str(params, "phone").unwrap_or_default();
    let email = get_opt_str(params, "email").unwrap_or_default();
    let principal_name = get_opt_str(params, "principalName").unwrap_or_default();
    let npsn = get_opt_str(params, "npsn").unwrap_or_default();
    let logo = get_opt_str(params, "logo");
    let now = store::now_iso();

    let existing = store::get_school_info(conn).map_err(db_err("db_query_failed"))?;
    match existing {
        Some(info) => {
            conn.execute(
                "UPDATE school_info SET name = ?, address = ?, phone = ?, email = ?,
                        principal_name = ?, npsn = ?, logo = ?, updated_at = ?
                 WHERE id = ?",
                rusqlite::params![name, address, phone, email, principal_name, npsn, logo, now, info.id],
            )
            .map_err(db_err("db_update_failed"))?;
        }
        None => {
            conn.execute(
                "INSERT INTO school_info(name, address, phone, email, principal_name, npsn, logo, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![name, address, phone, email, principal_name, npsn, logo, now],
            )
            .map_err(db_err("db_insert_failed"))?;
        }
    }

    let info = store::get_school_info(conn)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("school info not found after write"))?;
    Ok(json!({ "schoolInfo": info }))
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
        "schoolInfo.get" => Some(dispatch(state, req, |c, _| school_info_get(c))),
        "schoolInfo.set" => Some(dispatch(state, req, school_info_set)),
        _ => None,
    }
}
