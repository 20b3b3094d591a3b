use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_opt_bool, get_opt_i64, get_opt_str, get_required_i64, get_required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn name_taken(conn: &Connection, name: &str, exclude_id: Option<i64>) -> Result<bool, HandlerErr> {
    let found = match exclude_id {
        Some(id) => conn
            .query_row(
                "SELECT 1 FROM payment_types WHERE name = ? COLLATE NOCASE AND id != ?",
                (name, id),
                |r| r.get::<_, i64>(0),
            )
            .optional(),
        None => conn
            .query_row(
                "SELECT 1 FROM payment_types WHERE name = ? COLLATE NOCASE",
                [name],
                |r| r.get::<_, i64>(0),
            )
            .optional(),
    };
    found.map(|v| v.is_some()).map_err(db_err("db_query_failed"))
}

/// Either all four billing-period bounds are given or none of them.
fn read_period_bounds(
    params: &serde_json::Value,
) -> Result<(Option<i64>, Option<i64>, Option<i64>, Option<i64>), HandlerErr> {
    let from_month = get_opt_i64(params, "fromMonth");
    let from_year = get_opt_i64(params, "fromYear");
    let to_month = get_opt_i64(params, "toMonth");
    let to_year = get_opt_i64(params, "toYear");

    let given = [from_month, from_year, to_month, to_year]
        .iter()
        .filter(|v| v.is_some())
        .count();
    if given != 0 && given != 4 {
        return Err(HandlerErr::bad_params(
            "fromMonth, fromYear, toMonth and toYear must be given together",
        ));
    }
    for m in [from_month, to_month].into_iter().flatten() {
        if !(1..=12).contains(&m) {
            return Err(HandlerErr::bad_params("months must be between 1 and 12"));
        }
    }
    Ok((from_month, from_year, to_month, to_year))
}

fn types_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let types = store::list_payment_types(conn).map_err(db_err("db_query_failed"))?;
    Ok(json!({ "paymentTypes": types }))
}

fn types_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let payment_type = store::get_payment_type(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("payment type not found"))?;
    Ok(json!({ "paymentType": payment_type }))
}

fn types_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let amount = get_required_i64(params, "amount")?;
    if amount <= 0 {
        return Err(HandlerErr::bad_params("amount must be positive"));
    }
    let is_recurring = get_opt_bool(params, "isRecurring").unwrap_or(false);
    let allow_installment = get_opt_bool(params, "allowInstallment").unwrap_or(false);
    let description = get_opt_str(params, "description");
    let (from_month, from_year, to_month, to_year) = read_period_bounds(params)?;

    if name_taken(conn, &name, None)? {
        return Err(HandlerErr::new("duplicate_name", "payment type name already exists")
            .with_details(json!({ "name": name })));
    }

    conn.execute(
        "INSERT INTO payment_types(name, amount, is_recurring, allow_installment, description,
                                   from_month, from_year, to_month, to_year, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            name,
            amount,
            is_recurring as i64,
            allow_installment as i64,
            description,
            from_month,
            from_year,
            to_month,
            to_year,
            store::now_iso()
        ],
    )
    .map_err(db_err("db_insert_failed"))?;
    let id = conn.last_insert_rowid();

    let payment_type = store::get_payment_type(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("payment type not found after insert"))?;
    Ok(json!({ "paymentType": payment_type }))
}

fn types_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let existing = store::get_payment_type(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("payment type not found"))?;

    let name = get_opt_str(params, "name")
        .map(|n| n.trim().to_string())
        .unwrap_or(existing.name);
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    if name_taken(conn, &name, Some(id))? {
        return Err(HandlerErr::new("duplicate_name", "payment type name already exists")
            .with_details(json!({ "name": name })));
    }
    let amount = get_opt_i64(params, "amount").unwrap_or(existing.amount);
    if amount <= 0 {
        return Err(HandlerErr::bad_params("amount must be positive"));
    }
    let is_recurring = get_opt_bool(params, "isRecurring").unwrap_or(existing.is_recurring);
    let allow_installment =
        get_opt_bool(params, "allowInstallment").unwrap_or(existing.allow_installment);
    let description = match params.get("description") {
        Some(v) if v.is_null() => None,
        Some(v) => v.as_str().map(|s| s.to_string()),
        None => existing.description,
    };
    let (from_month, from_year, to_month, to_year) = if params.get("fromMonth").is_some()
        || params.get("fromYear").is_some()
        || params.get("toMonth").is_some()
        || params.get("toYear").is_some()
    {
        read_period_bounds(params)?
    } else {
        (
            existing.from_month,
            existing.from_year,
            existing.to_month,
            existing.to_year,
        )
    };

    conn.execute(
        "UPDATE payment_types SET name = ?, amount = ?, is_recurring = ?, allow_installment = ?,
                description = ?, from_month = ?, from_year = ?, to_month = ?, to_year = ?
         WHERE id = ?",
        rusqlite::params![
            name,
            amount,
            is_recurring as i64,
            allow_installment as i64,
            description,
            from_month,
            from_year,
            to_month,
            to_year,
            id
        ],
    )
    .map_err(db_err("db_update_failed"))?;

    // Refresh the name snapshot on existing payment rows.
    conn.execute(
        "UPDATE payments SET payment_type_name = ? WHERE payment_type_id = ?",
        (&name, id),
    )
    .map_err(db_err("db_update_failed"))?;

    let payment_type = store::get_payment_type(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("payment type not found"))?;
    Ok(json!({ "paymentType": payment_type }))
}

fn types_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let deleted = conn
        .execute("DELETE FROM payment_types WHERE id = ?", [id])
        .map_err(db_err("db_delete_failed"))?;
    if deleted == 0 {
        return Err(HandlerErr::not_found("payment type not found"));
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
        "paymentTypes.list" => Some(dispatch(state, req, |c, _| types_list(c))),
        "paymentTypes.get" => Some(dispatch(state, req, types_get)),
        "paymentTypes.create" => Some(dispatch(state, req, types_create)),
        "paymentTypes.update" => Some(dispatch(state, req, types_update)),
        "paymentTypes.delete" => Some(dispatch(state, req, types_delete)),
        _ => None,
    }
}
