use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_err, get_opt_i64, get_opt_str, get_required_i64, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::Connection;
use serde_json::json;

fn classes_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    // Include the active-student count so the UI can show class occupancy
    // without a second round trip.
    let base = "SELECT
                  c.id, c.name, c.grade, c.academic_year_id, c.created_at,
                  (SELECT COUNT(*) FROM students s
                   WHERE s.class_id = c.id AND s.status = 'active') AS student_count
                FROM classes c";
    let row_to_json = |row: &rusqlite::Row| -> rusqlite::Result<serde_json::Value> {
        Ok(json!({
            "id": row.get::<_, i64>(0)?,
            "name": row.get::<_, String>(1)?,
            "grade": row.get::<_, i64>(2)?,
            "academicYearId": row.get::<_, Option<i64>>(3)?,
            "createdAt": row.get::<_, String>(4)?,
            "studentCount": row.get::<_, i64>(5)?,
        }))
    };

    let classes = match get_opt_i64(params, "academicYearId") {
        Some(year_id) => {
            let mut stmt = conn
                .prepare(&format!(
                    "{} WHERE c.academic_year_id = ? ORDER BY c.grade, c.name",
                    base
                ))
                .map_err(db_err("db_query_failed"))?;
            stmt.query_map([year_id], row_to_json)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(db_err("db_query_failed"))?
        }
        None => {
            let mut stmt = conn
                .prepare(&format!("{} ORDER BY c.grade, c.name", base))
                .map_err(db_err("db_query_failed"))?;
            stmt.query_map([], row_to_json)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(db_err("db_query_failed"))?
        }
    };
    Ok(json!({ "classes": classes }))
}

fn classes_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let class = store::get_class(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("class not found"))?;
    Ok(json!({ "class": class }))
}

fn classes_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let grade = get_required_i64(params, "grade")?;
    let academic_year_id = get_opt_i64(params, "academicYearId");

    conn.execute(
        "INSERT INTO classes(name, grade, academic_year_id, created_at) VALUES(?, ?, ?, ?)",
        (&name, grade, academic_year_id, store::now_iso()),
    )
    .map_err(db_err("db_insert_failed"))?;
    let id = conn.last_insert_rowid();

    let class = store::get_class(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("class not found after insert"))?;
    Ok(json!({ "class": class }))
}

fn classes_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let existing = store::get_class(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("class not found"))?;

    let name = get_opt_str(params, "name")
        .map(|n| n.trim().to_string())
        .unwrap_or(existing.name);
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let grade = get_opt_i64(params, "grade").unwrap_or(existing.grade);
    let academic_year_id = match params.get("academicYearId") {
        Some(v) if v.is_null() => None,
        Some(v) => v.as_i64(),
        None => existing.academic_year_id,
    };

    conn.execute(
        "UPDATE classes SET name = ?, grade = ?, academic_year_id = ? WHERE id = ?",
        (&name, grade, academic_year_id, id),
    )
    .map_err(db_err("db_update_failed"))?;

    // Keep the denormalized class name on students in sync.
    conn.execute(
        "UPDATE students SET class_name = ? WHERE class_id = ?",
        (&name, id),
    )
    .map_err(db_err("db_update_failed"))?;

    let class = store::get_class(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("class not found"))?;
    Ok(json!({ "class": class }))
}

/// A class with active students cannot be deleted; the caller must move or
/// graduate them first.
fn classes_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    if store::get_class(conn, id)
        .map_err(db_err("db_query_failed"))?
        .is_none()
    {
        return Err(HandlerErr::not_found("class not found"));
    }

    let active = store::count_active_students_in_class(conn, id).map_err(db_err("db_query_failed"))?;
    if active > 0 {
        return Err(
            HandlerErr::new("class_in_use", "class still has active students")
                .with_details(json!({ "activeStudents": active })),
        );
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;
    // Inactive students keep their row but lose the dangling class link.
    tx.execute(
        "UPDATE students SET class_id = NULL WHERE class_id = ?",
        [id],
    )
    .map_err(db_err("db_update_failed"))?;
    tx.execute("DELETE FROM classes WHERE id = ?", [id])
        .map_err(db_err("db_delete_failed"))?;
    tx.commit().map_err(db_err("db_commit_failed"))?;

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
        "classes.list" => Some(dispatch(state, req, classes_list)),
        "classes.get" => Some(dispatch(state, req, classes_get)),
        "classes.create" => Some(dispatch(state, req, classes_create)),
        "classes.update" => Some(dispatch(state, req, classes_update)),
        "classes.delete" => Some(dispatch(state, req, classes_delete)),
        _ => None,
    }
}
