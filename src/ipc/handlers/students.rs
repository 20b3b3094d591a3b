use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_opt_i64, get_opt_str, get_required_i64, get_required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::{Connection, ToSql};
use serde_json::json;

const STATUSES: &[&str] = &["active", "inactive", "graduated"];

fn validate_status(status: &str) -> Result<(), HandlerErr> {
    if STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(HandlerErr::bad_params(format!(
            "status must be one of: {}",
            STATUSES.join(", ")
        )))
    }
}

/// Resolves the denormalized class name snapshot for a (possibly absent)
/// class id.
fn class_name_for(conn: &Connection, class_id: Option<i64>) -> Result<String, HandlerErr> {
    let Some(id) = class_id else {
        return Ok(String::new());
    };
    let class = store::get_class(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("class not found"))?;
    Ok(class.name)
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(search) = get_opt_str(params, "search").filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        clauses.push("(name LIKE ?1 OR nis LIKE ?1 OR nisn LIKE ?1)".to_string());
        args.push(Box::new(pattern));
    }
    if let Some(status) = get_opt_str(params, "status") {
        validate_status(&status)?;
        clauses.push(format!("status = ?{}", args.len() + 1));
        args.push(Box::new(status));
    }
    if let Some(class_id) = get_opt_i64(params, "classId") {
        clauses.push(format!("class_id = ?{}", args.len() + 1));
        args.push(Box::new(class_id));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let arg_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM students{}", where_sql),
            arg_refs.as_slice(),
            |r| r.get(0),
        )
        .map_err(db_err("db_query_failed"))?;

    let limit = store::clamp_limit(get_opt_i64(params, "limit"), 100, 500);
    let offset = get_opt_i64(params, "offset").unwrap_or(0).max(0);

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM students{} ORDER BY name LIMIT {} OFFSET {}",
            store::STUDENT_COLS,
            where_sql,
            limit,
            offset
        ))
        .map_err(db_err("db_query_failed"))?;
    let students = stmt
        .query_map(arg_refs.as_slice(), store::student_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;

    Ok(json!({ "students": students, "total": total }))
}

fn students_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let student = store::get_student(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({ "student": student }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let nis = get_required_str(params, "nis")?.trim().to_string();
    let nisn = get_required_str(params, "nisn")?.trim().to_string();
    let name = get_required_str(params, "name")?.trim().to_string();
    if nis.is_empty() || nisn.is_empty() || name.is_empty() {
        return Err(HandlerErr::bad_params("nis, nisn and name must not be empty"));
    }
    let gender = get_required_str(params, "gender")?;
    let class_id = get_opt_i64(params, "classId");
    let birth_place = get_opt_str(params, "birthPlace").unwrap_or_default();
    let birth_date = get_opt_str(params, "birthDate").unwrap_or_default();
    let address = get_opt_str(params, "address").unwrap_or_default();
    let parent_name = get_opt_str(params, "parentName").unwrap_or_default();
    let parent_phone = get_opt_str(params, "parentPhone").unwrap_or_default();
    let status = get_opt_str(params, "status").unwrap_or_else(|| "active".to_string());
    validate_status(&status)?;

    if store::student_nis_exists(conn, &nis, None).map_err(db_err("db_query_failed"))? {
        return Err(HandlerErr::new("duplicate_nis", "NIS already registered")
            .with_details(json!({ "nis": nis })));
    }
    if store::student_nisn_exists(conn, &nisn, None).map_err(db_err("db_query_failed"))? {
        return Err(HandlerErr::new("duplicate_nisn", "NISN already registered")
            .with_details(json!({ "nisn": nisn })));
    }

    let class_name = class_name_for(conn, class_id)?;
    let now = store::now_iso();
    conn.execute(
        "INSERT INTO students(nis, nisn, name, gender, class_id, class_name, birth_place,
                              birth_date, address, parent_name, parent_phone, status,
                              created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            nis,
            nisn,
            name,
            gender,
            class_id,
            class_name,
            birth_place,
            birth_date,
            address,
            parent_name,
            parent_phone,
            status,
            now,
            now
        ],
    )
    .map_err(db_err("db_insert_failed"))?;
    let id = conn.last_insert_rowid();

    let student = store::get_student(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("student not found after insert"))?;
    Ok(json!({ "student": student }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let existing = store::get_student(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;

    let nis = get_opt_str(params, "nis")
        .map(|v| v.trim().to_string())
        .unwrap_or(existing.nis);
    let nisn = get_opt_str(params, "nisn")
        .map(|v| v.trim().to_string())
        .unwrap_or(existing.nisn);
    let name = get_opt_str(params, "name")
        .map(|v| v.trim().to_string())
        .unwrap_or(existing.name);
    if nis.is_empty() || nisn.is_empty() || name.is_empty() {
        return Err(HandlerErr::bad_params("nis, nisn and name must not be empty"));
    }
    if store::student_nis_exists(conn, &nis, Some(id)).map_err(db_err("db_query_failed"))? {
        return Err(HandlerErr::new("duplicate_nis", "NIS already registered")
            .with_details(json!({ "nis": nis })));
    }
    if store::student_nisn_exists(conn, &nisn, Some(id)).map_err(db_err("db_query_failed"))? {
        return Err(HandlerErr::new("duplicate_nisn", "NISN already registered")
            .with_details(json!({ "nisn": nisn })));
    }

    let gender = get_opt_str(params, "gender").unwrap_or(existing.gender);
    let class_id = match params.get("classId") {
        Some(v) if v.is_null() => None,
        Some(v) => v.as_i64(),
        None => existing.class_id,
    };
    let class_name = class_name_for(conn, class_id)?;
    let birth_place = get_opt_str(params, "birthPlace").unwrap_or(existing.birth_place);
    let birth_date = get_opt_str(params, "birthDate").unwrap_or(existing.birth_date);
    let address = get_opt_str(params, "address").unwrap_or(existing.address);
    let parent_name = get_opt_str(params, "parentName").unwrap_or(existing.parent_name);
    let parent_phone = get_opt_str(params, "parentPhone").unwrap_or(existing.parent_phone);
    let status = get_opt_str(params, "status").unwrap_or(existing.status);
    validate_status(&status)?;

    conn.execute(
        "UPDATE students SET nis = ?, nisn = ?, name = ?, gender = ?, class_id = ?,
                class_name = ?, birth_place = ?, birth_date = ?, address = ?,
                parent_name = ?, parent_phone = ?, status = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            nis,
            nisn,
            name,
            gender,
            class_id,
            class_name,
            birth_place,
            birth_date,
            address,
            parent_name,
            parent_phone,
            status,
            store::now_iso(),
            id
        ],
    )
    .map_err(db_err("db_update_failed"))?;

    let student = store::get_student(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({ "student": student }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let deleted = conn
        .execute("DELETE FROM students WHERE id = ?", [id])
        .map_err(db_err("db_delete_failed"))?;
    if deleted == 0 {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(json!({ "ok": true }))
}

struct BatchChange {
    id: i64,
    // Some(None) clears the class link, None leaves it untouched.
    class_id: Option<Option<i64>>,
    class_name: Option<String>,
    status: Option<String>,
}

/// Year-end promotion helper: each entry carries its own target class and/or
/// status, so 7A can move to 8A while 7B moves to 8B in one call. The whole
/// array is validated before anything is written; one bad entry fails the
/// batch.
fn students_batch_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let updates = params
        .get("updates")
        .and_then(|v| v.as_array())
        .filter(|arr| !arr.is_empty())
        .ok_or_else(|| HandlerErr::bad_params("updates must be a non-empty array"))?;

    let mut changes: Vec<BatchChange> = Vec::with_capacity(updates.len());
    for entry in updates {
        let id = entry
            .get("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| HandlerErr::bad_params("each update needs a numeric id"))?;
        let class_id = match entry.get("classId") {
            Some(v) if v.is_null() => Some(None),
            Some(v) => Some(Some(v.as_i64().ok_or_else(|| {
                HandlerErr::bad_params("classId must be a number or null")
            })?)),
            None => None,
        };
        let status = match entry.get("status").and_then(|v| v.as_str()) {
            Some(s) => {
                validate_status(s)?;
                Some(s.to_string())
            }
            None => None,
        };
        if class_id.is_none() && status.is_none() {
            return Err(HandlerErr::bad_params(format!(
                "update for student {} must set classId or status",
                id
            )));
        }
        if store::get_student(conn, id)
            .map_err(db_err("db_query_failed"))?
            .is_none()
        {
            return Err(HandlerErr::not_found(format!("student {} not found", id)));
        }
        let class_name = match class_id {
            Some(cid) => Some(class_name_for(conn, cid)?),
            None => None,
        };
        changes.push(BatchChange {
            id,
            class_id,
            class_name,
            status,
        });
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;
    let now = store::now_iso();
    for change in &changes {
        if let (Some(cid), Some(cname)) = (change.class_id.as_ref(), change.class_name.as_ref()) {
            tx.execute(
                "UPDATE students SET class_id = ?, class_name = ?, updated_at = ? WHERE id = ?",
                rusqlite::params![cid, cname, now, change.id],
            )
            .map_err(db_err("db_update_failed"))?;
        }
        if let Some(status) = change.status.as_ref() {
            tx.execute(
                "UPDATE students SET status = ?, updated_at = ? WHERE id = ?",
                rusqlite::params![status, now, change.id],
            )
            .map_err(db_err("db_update_failed"))?;
        }
    }
    tx.commit().map_err(db_err("db_commit_failed"))?;

    Ok(json!({ "updated": changes.len() }))
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
        "students.list" => Some(dispatch(state, req, students_list)),
        "students.get" => Some(dispatch(state, req, students_get)),
        "students.create" => Some(dispatch(state, req, students_create)),
        "students.update" => Some(dispatch(state, req, students_update)),
        "students.delete" => Some(dispatch(state, req, students_delete)),
        "students.batchUpdate" => Some(dispatch(state, req, students_batch_update)),
        _ => None,
    }
}
