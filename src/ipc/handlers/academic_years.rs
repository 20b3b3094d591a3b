use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_opt_bool, get_opt_str, get_required_i64, get_required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::Connection;
use serde_json::json;

fn years_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM academic_years ORDER BY name DESC",
            store::ACADEMIC_YEAR_COLS
        ))
        .map_err(db_err("db_query_failed"))?;
    let years = stmt
        .query_map([], store::academic_year_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;
    Ok(json!({ "academicYears": years }))
}

fn years_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let year = store::get_academic_year(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("academic year not found"))?;
    Ok(json!({ "academicYear": year }))
}

fn years_active(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let year = store::get_active_academic_year(conn).map_err(db_err("db_query_failed"))?;
    Ok(json!({ "academicYear": year }))
}

fn years_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let start_date = get_required_str(params, "startDate")?;
    let end_date = get_required_str(params, "endDate")?;
    let make_active = get_opt_bool(params, "isActive").unwrap_or(false);

    if store::academic_year_name_exists(conn, &name, None).map_err(db_err("db_query_failed"))? {
        return Err(
            HandlerErr::new("duplicate_name", "academic year name already exists")
                .with_details(json!({ "name": name })),
        );
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;
    if make_active {
        tx.execute("UPDATE academic_years SET is_active = 0", [])
            .map_err(db_err("db_update_failed"))?;
    }
    tx.execute(
        "INSERT INTO academic_years(name, start_date, end_date, is_active, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (&name, &start_date, &end_date, make_active as i64, store::now_iso()),
    )
    .map_err(db_err("db_insert_failed"))?;
    let id = tx.last_insert_rowid();
    tx.commit().map_err(db_err("db_commit_failed"))?;

    let year = store::get_academic_year(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("academic year not found after insert"))?;
    Ok(json!({ "academicYear": year }))
}

fn years_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let existing = store::get_academic_year(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("academic year not found"))?;

    let name = get_opt_str(params, "name")
        .map(|n| n.trim().to_string())
        .unwrap_or(existing.name);
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    if store::academic_year_name_exists(conn, &name, Some(id)).map_err(db_err("db_query_failed"))? {
        return Err(
            HandlerErr::new("duplicate_name", "academic year name already exists")
                .with_details(json!({ "name": name })),
        );
    }
    let start_date = get_opt_str(params, "startDate").unwrap_or(existing.start_date);
    let end_date = get_opt_str(params, "endDate").unwrap_or(existing.end_date);
    let is_active = get_opt_bool(params, "isActive").unwrap_or(existing.is_active);

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;
    if is_active {
        // Same single-active rule as activate: flipping this year on flips
        // the others off.
        tx.execute("UPDATE academic_years SET is_active = 0", [])
            .map_err(db_err("db_update_failed"))?;
    }
    tx.execute(
        "UPDATE academic_years SET name = ?, start_date = ?, end_date = ?, is_active = ? WHERE id = ?",
        (&name, &start_date, &end_date, is_active as i64, id),
    )
    .map_err(db_err("db_update_failed"))?;
    tx.commit().map_err(db_err("db_commit_failed"))?;

    let year = store::get_academic_year(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("academic year not found"))?;
    Ok(json!({ "academicYear": year }))
}

/// Exactly one year is active at a time; activation flips the rest off in
/// the same transaction.
fn years_activate(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    if store::get_academic_year(conn, id)
        .map_err(db_err("db_query_failed"))?
        .is_none()
    {
        return Err(HandlerErr::not_found("academic year not found"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;
    tx.execute("UPDATE academic_years SET is_active = 0", [])
        .map_err(db_err("db_update_failed"))?;
    tx.execute("UPDATE academic_years SET is_active = 1 WHERE id = ?", [id])
        .map_err(db_err("db_update_failed"))?;
    tx.commit().map_err(db_err("db_commit_failed"))?;

    let year = store::get_academic_year(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("academic year not found"))?;
    Ok(json!({ "academicYear": year }))
}

fn years_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let deleted = conn
        .execute("DELETE FROM academic_years WHERE id = ?", [id])
        .map_err(db_err("db_delete_failed"))?;
    if deleted == 0 {
        return Err(HandlerErr::not_found("academic year not found"));
    }
    Ok(json!({ "ok": true }))
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
        "academicYears.list" => Some(dispatch(state, req, |c, _| years_list(c))),
        "academicYears.get" => Some(dispatch(state, req, years_get)),
        "academicYears.active" => Some(dispatch(state, req, |c, _| years_active(c))),
        "academicYears.create" => Some(dispatch(state, req, years_create)),
        "academicYears.update" => Some(dispatch(state, req, years_update)),
        "academicYears.activate" => Some(dispatch(state, req, years_activate)),
        "academicYears.delete" => Some(dispatch(state, req, years_delete)),
        _ => None,
    }
}
