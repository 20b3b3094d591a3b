use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_err, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

fn field_str(v: &serde_json::Value, key: &str) -> String {
    v.get(key).and_then(|x| x.as_str()).unwrap_or("").to_string()
}

fn field_opt_str(v: &serde_json::Value, key: &str) -> Option<String> {
    v.get(key).and_then(|x| x.as_str()).map(|s| s.to_string())
}

fn field_i64(v: &serde_json::Value, key: &str) -> i64 {
    v.get(key).and_then(|x| x.as_i64()).unwrap_or(0)
}

fn field_opt_i64(v: &serde_json::Value, key: &str) -> Option<i64> {
    v.get(key).and_then(|x| x.as_i64())
}

fn field_bool(v: &serde_json::Value, key: &str) -> bool {
    v.get(key).and_then(|x| x.as_bool()).unwrap_or(false)
}

fn rows_of(data: &serde_json::Value, key: &str) -> Vec<serde_json::Value> {
    data.get(key)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

fn database_export(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let academic_years = {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM academic_years ORDER BY id",
                store::ACADEMIC_YEAR_COLS
            ))
            .map_err(db_err("db_query_failed"))?;
        stmt.query_map([], store::academic_year_from_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err("db_query_failed"))?
    };
    let classes = {
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM classes ORDER BY id", store::CLASS_COLS))
            .map_err(db_err("db_query_failed"))?;
        stmt.query_map([], store::class_from_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err("db_query_failed"))?
    };
    let students = {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM students ORDER BY id",
                store::STUDENT_COLS
            ))
            .map_err(db_err("db_query_failed"))?;
        stmt.query_map([], store::student_from_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err("db_query_failed"))?
    };
    let payment_types = store::list_payment_types(conn).map_err(db_err("db_query_failed"))?;
    let payments = {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM payments ORDER BY id",
                store::PAYMENT_COLS
            ))
            .map_err(db_err("db_query_failed"))?;
        stmt.query_map([], store::payment_from_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err("db_query_failed"))?
    };
    let school_info = store::get_school_info(conn).map_err(db_err("db_query_failed"))?;

    let total_records = academic_years.len()
        + classes.len()
        + students.len()
        + payment_types.len()
        + payments.len()
        + school_info.iter().count();

    Ok(json!({
        "data": {
            "academicYears": academic_years,
            "classes": classes,
            "students": students,
            "paymentTypes": payment_types,
            "payments": payments,
            "schoolInfo": school_info,
        },
        "metadata": {
            "exportedAt": store::now_iso(),
            "totalRecords": total_records,
            "version": "1.0",
        },
    }))
}

/// Replaces the whole database with an exported document. Ids are reassigned
/// on insert; references are remapped from old ids to new ones. References
/// that cannot be remapped are nulled for students and kept as-is for
/// payment rows, which only need them for grouping.
fn database_import(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let data = params
        .get("data")
        .ok_or_else(|| HandlerErr::bad_params("missing data"))?;

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;

    for (_, table) in store::CLEAR_ORDER {
        tx.execute(&format!("DELETE FROM {}", table), [])
            .map_err(db_err("db_delete_failed"))?;
    }
    store::reset_sequences(&tx);

    let mut warnings = 0usize;
    let mut imported: HashMap<&str, usize> = HashMap::new();

    let mut year_map: HashMap<i64, i64> = HashMap::new();
    for row in rows_of(data, "academicYears") {
        tx.execute(
            "INSERT INTO academic_years(name, start_date, end_date, is_active, created_at)
             VALUES(?, ?, ?, ?, ?)",
            rusqlite::params![
                field_str(&row, "name"),
                field_str(&row, "startDate"),
                field_str(&row, "endDate"),
                field_bool(&row, "isActive") as i64,
                field_str(&row, "createdAt"),
            ],
        )
        .map_err(db_err("db_insert_failed"))?;
        year_map.insert(field_i64(&row, "id"), tx.last_insert_rowid());
        *imported.entry("academicYears").or_default() += 1;
    }

    let mut class_map: HashMap<i64, i64> = HashMap::new();
    for row in rows_of(data, "classes") {
        let year_id = match field_opt_i64(&row, "academicYearId") {
            Some(old) => match year_map.get(&old) {
                Some(new) => Some(*new),
                None => {
                    warnings += 1;
                    None
                }
            },
            None => None,
        };
        tx.execute(
            "INSERT INTO classes(name, grade, academic_year_id, created_at) VALUES(?, ?, ?, ?)",
            rusqlite::params![
                field_str(&row, "name"),
                field_i64(&row, "grade"),
                year_id,
                field_str(&row, "createdAt"),
            ],
        )
        .map_err(db_err("db_insert_failed"))?;
        class_map.insert(field_i64(&row, "id"), tx.last_insert_rowid());
        *imported.entry("classes").or_default() += 1;
    }

    let mut student_map: HashMap<i64, i64> = HashMap::new();
    for row in rows_of(data, "students") {
        let class_id = match field_opt_i64(&row, "classId") {
            Some(old) => match class_map.get(&old) {
                Some(new) => Some(*new),
                None => {
                    warnings += 1;
                    None
                }
            },
            None => None,
        };
        tx.execute(
            "INSERT INTO students(nis, nisn, name, gender, class_id, class_name, birth_place,
                                  birth_date, address, parent_name, parent_phone, status,
                                  created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                field_str(&row, "nis"),
                field_str(&row, "nisn"),
                field_str(&row, "name"),
                field_str(&row, "gender"),
                class_id,
                field_str(&row, "className"),
                field_str(&row, "birthPlace"),
                field_str(&row, "birthDate"),
                field_str(&row, "address"),
                field_str(&row, "parentName"),
                field_str(&row, "parentPhone"),
                field_str(&row, "status"),
                field_str(&row, "createdAt"),
                field_str(&row, "updatedAt"),
            ],
        )
        .map_err(db_err("db_insert_failed"))?;
        student_map.insert(field_i64(&row, "id"), tx.last_insert_rowid());
        *imported.entry("students").or_default() += 1;
    }

    let mut type_map: HashMap<i64, i64> = HashMap::new();
    for row in rows_of(data, "paymentTypes") {
        tx.execute(
            "INSERT INTO payment_types(name, amount, is_recurring, allow_installment, description,
                                       from_month, from_year, to_month, to_year, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                field_str(&row, "name"),
                field_i64(&row, "amount"),
                field_bool(&row, "isRecurring") as i64,
                field_bool(&row, "allowInstallment") as i64,
                field_opt_str(&row, "description"),
                field_opt_i64(&row, "fromMonth"),
                field_opt_i64(&row, "fromYear"),
                field_opt_i64(&row, "toMonth"),
                field_opt_i64(&row, "toYear"),
                field_str(&row, "createdAt"),
            ],
        )
        .map_err(db_err("db_insert_failed"))?;
        type_map.insert(field_i64(&row, "id"), tx.last_insert_rowid());
        *imported.entry("paymentTypes").or_default() += 1;
    }

    let remap = |map: &HashMap<i64, i64>, old: i64, warnings: &mut usize| -> i64 {
        match map.get(&old) {
            Some(new) => *new,
            None => {
                *warnings += 1;
                old
            }
        }
    };
    let mut payment_map: HashMap<i64, i64> = HashMap::new();
    for row in rows_of(data, "payments") {
        let student_id = remap(&student_map, field_i64(&row, "studentId"), &mut warnings);
        let type_id = remap(&type_map, field_i64(&row, "paymentTypeId"), &mut warnings);
        let year_id = remap(&year_map, field_i64(&row, "academicYearId"), &mut warnings);
        let installment_of = field_opt_i64(&row, "installmentOf")
            .map(|old| *payment_map.get(&old).unwrap_or(&old));
        tx.execute(
            "INSERT INTO payments(student_id, student_name, student_nis, class_name,
                                  payment_type_id, payment_type_name, amount, month, year,
                                  academic_year_id, payment_date, receipt_number, payment_method,
                                  notes, created_by, is_installment, installment_of,
                                  installment_number, total_installments, is_paid_off,
                                  original_amount, remaining_amount, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                student_id,
                field_str(&row, "studentName"),
                field_str(&row, "studentNis"),
                field_str(&row, "className"),
                type_id,
                field_str(&row, "paymentTypeName"),
                field_i64(&row, "amount"),
                field_opt_i64(&row, "month"),
                field_i64(&row, "year"),
                year_id,
                field_str(&row, "paymentDate"),
                field_str(&row, "receiptNumber"),
                field_str(&row, "paymentMethod"),
                field_opt_str(&row, "notes"),
                field_str(&row, "createdBy"),
                field_bool(&row, "isInstallment") as i64,
                installment_of,
                field_opt_i64(&row, "installmentNumber"),
                field_opt_i64(&row, "totalInstallments"),
                field_bool(&row, "isPaidOff") as i64,
                field_opt_i64(&row, "originalAmount"),
                field_opt_i64(&row, "remainingAmount"),
                field_str(&row, "createdAt"),
            ],
        )
        .map_err(db_err("db_insert_failed"))?;
        payment_map.insert(field_i64(&row, "id"), tx.last_insert_rowid());
        *imported.entry("payments").or_default() += 1;
    }

    let school_rows = match data.get("schoolInfo") {
        Some(v) if v.is_array() => rows_of(data, "schoolInfo"),
        Some(v) if v.is_object() => vec![v.clone()],
        _ => Vec::new(),
    };
    for row in school_rows {
        tx.execute(
            "INSERT INTO school_info(name, address, phone, email, principal_name, npsn, logo, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                field_str(&row, "name"),
                field_str(&row, "address"),
                field_str(&row, "phone"),
                field_str(&row, "email"),
                field_str(&row, "principalName"),
                field_str(&row, "npsn"),
                field_opt_str(&row, "logo"),
                field_str(&row, "updatedAt"),
            ],
        )
        .map_err(db_err("db_insert_failed"))?;
        *imported.entry("schoolInfo").or_default() += 1;
    }

    tx.commit().map_err(db_err("db_commit_failed"))?;

    let imported_json: serde_json::Map<String, serde_json::Value> = imported
        .into_iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();
    Ok(json!({
        "imported": imported_json,
        "warnings": warnings,
    }))
}

fn database_reset(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let outcome = store::clear_all_tables(conn);
    store::reset_sequences(conn);
    let failed: Vec<serde_json::Value> = outcome
        .failed
        .iter()
        .map(|(label, reason)| json!({ "table": label, "error": reason }))
        .collect();
    Ok(json!({
        "tablesCleared": outcome.cleared,
        "tablesFailed": failed,
    }))
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
        "database.export" => Some(dispatch(state, req, |c, _| database_export(c))),
        "database.import" => Some(dispatch(state, req, database_import)),
        "database.reset" => Some(dispatch(state, req, |c, _| database_reset(c))),
        _ => None,
    }
}
