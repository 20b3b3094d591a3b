use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_opt_bool, get_opt_i64, get_opt_str, get_required_i64, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::receipt;
use crate::status;
use crate::store;
use rusqlite::{Connection, OptionalExtension, ToSql};
use serde_json::json;
use uuid::Uuid;

/// Receipt numbers look like KWT/20240705/483920: the payment date plus a
/// random six-digit suffix, retried on the rare collision.
fn generate_receipt_number(conn: &Connection, payment_date: &str) -> Result<String, HandlerErr> {
    let date_part: String = payment_date.chars().filter(|c| c.is_ascii_digit()).collect();
    for _ in 0..5 {
        let suffix = (Uuid::new_v4().as_u128() % 1_000_000) as u32;
        let candidate = format!("KWT/{}/{:06}", date_part, suffix);
        let taken = conn
            .query_row(
                "SELECT 1 FROM payments WHERE receipt_number = ?",
                [&candidate],
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map_err(db_err("db_query_failed"))?;
        if taken.is_none() {
            return Ok(candidate);
        }
    }
    Err(HandlerErr::new(
        "db_insert_failed",
        "could not allocate a unique receipt number",
    ))
}

/// The calendar year a month belongs to inside a July-June academic year.
fn calendar_year_for(year_name: &str, month: Option<i64>) -> i64 {
    let Some((start, end)) = status::parse_year_span(year_name) else {
        return chrono::Utc::now().format("%Y").to_string().parse().unwrap_or(0);
    };
    match month {
        Some(m) if (1..=6).contains(&m) => end as i64,
        _ => start as i64,
    }
}

fn payments_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();

    for (key, column) in [
        ("studentId", "student_id"),
        ("paymentTypeId", "payment_type_id"),
        ("academicYearId", "academic_year_id"),
        ("month", "month"),
        ("year", "year"),
    ] {
        if let Some(v) = get_opt_i64(params, key) {
            clauses.push(format!("{} = ?{}", column, args.len() + 1));
            args.push(Box::new(v));
        }
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let arg_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM payments{}", where_sql),
            arg_refs.as_slice(),
            |r| r.get(0),
        )
        .map_err(db_err("db_query_failed"))?;

    let limit = store::clamp_limit(get_opt_i64(params, "limit"), 100, 500);
    let offset = get_opt_i64(params, "offset").unwrap_or(0).max(0);

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM payments{} ORDER BY payment_date DESC, id DESC LIMIT {} OFFSET {}",
            store::PAYMENT_COLS,
            where_sql,
            limit,
            offset
        ))
        .map_err(db_err("db_query_failed"))?;
    let payments = stmt
        .query_map(arg_refs.as_slice(), store::payment_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;

    Ok(json!({ "payments": payments, "total": total }))
}

fn payments_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let payment = store::get_payment(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("payment not found"))?;
    Ok(json!({ "payment": payment }))
}

fn payments_list_by_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let payments = match get_opt_i64(params, "academicYearId") {
        Some(year_id) => {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM payments
                     WHERE student_id = ? AND academic_year_id = ?
                     ORDER BY payment_date DESC, id DESC",
                    store::PAYMENT_COLS
                ))
                .map_err(db_err("db_query_failed"))?;
            stmt.query_map((student_id, year_id), store::payment_from_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(db_err("db_query_failed"))?
        }
        None => {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM payments WHERE student_id = ? ORDER BY payment_date DESC, id DESC",
                    store::PAYMENT_COLS
                ))
                .map_err(db_err("db_query_failed"))?;
            stmt.query_map([student_id], store::payment_from_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(db_err("db_query_failed"))?
        }
    };
    Ok(json!({ "payments": payments }))
}

fn payments_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let payment_type_id = get_required_i64(params, "paymentTypeId")?;
    let amount = get_required_i64(params, "amount")?;
    if amount <= 0 {
        return Err(HandlerErr::bad_params("amount must be positive"));
    }

    let student = store::get_student(conn, student_id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    let payment_type = store::get_payment_type(conn, payment_type_id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("payment type not found"))?;

    let academic_year = match get_opt_i64(params, "academicYearId") {
        Some(id) => store::get_academic_year(conn, id)
            .map_err(db_err("db_query_failed"))?
            .ok_or_else(|| HandlerErr::not_found("academic year not found"))?,
        None => store::get_active_academic_year(conn)
            .map_err(db_err("db_query_failed"))?
            .ok_or_else(|| {
                HandlerErr::bad_params("no active academic year; pass academicYearId")
            })?,
    };

    let month = get_opt_i64(params, "month");
    if payment_type.is_recurring {
        match month {
            Some(m) if (1..=12).contains(&m) => {}
            Some(_) => return Err(HandlerErr::bad_params("month must be between 1 and 12")),
            None => {
                return Err(HandlerErr::bad_params(
                    "month is required for a recurring payment type",
                ))
            }
        }
    } else if month.is_some() {
        return Err(HandlerErr::bad_params(
            "month does not apply to a one-time payment type",
        ));
    }

    // Settlement guards: a month that is already closed out, or a one-time
    // fee already paid, cannot be paid again.
    let facts = store::payment_facts(conn, student_id, payment_type_id, academic_year.id)
        .map_err(db_err("db_query_failed"))?;
    if payment_type.is_recurring {
        let m = month.unwrap_or(0) as u32;
        if status::paid_months(&facts).contains(&m) {
            return Err(HandlerErr::new(
                "month_already_settled",
                format!("{} {} is already settled", receipt::month_name(m), academic_year.name),
            )
            .with_details(json!({ "month": m })));
        }
    } else if status::one_time_status(&facts, payment_type.amount).is_paid {
        return Err(HandlerErr::new(
            "already_settled",
            "this payment type is already settled for the student",
        ));
    }

    let is_installment = get_opt_bool(params, "isInstallment").unwrap_or(false);
    if is_installment && !payment_type.allow_installment {
        return Err(HandlerErr::bad_params(
            "payment type does not allow installments",
        ));
    }

    let installment_of = get_opt_i64(params, "installmentOf");
    let (original_amount, remaining_amount, is_paid_off, installment_number) = if is_installment {
        let original = get_opt_i64(params, "originalAmount").unwrap_or(payment_type.amount);
        // Prior progress on the same plan: the root payment plus every row
        // that points back at it.
        let (prior_paid, prior_count) = match installment_of {
            Some(root) => conn
                .query_row(
                    "SELECT COALESCE(SUM(amount), 0), COUNT(*)
                     FROM payments WHERE id = ? OR installment_of = ?",
                    (root, root),
                    |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)),
                )
                .map_err(db_err("db_query_failed"))?,
            None => (0, 0),
        };
        let remaining = (original - prior_paid - amount).max(0);
        let paid_off = get_opt_bool(params, "isPaidOff").unwrap_or(remaining == 0);
        let number = get_opt_i64(params, "installmentNumber").unwrap_or(prior_count + 1);
        (Some(original), Some(remaining), paid_off, Some(number))
    } else {
        (None, None, false, None)
    };
    let total_installments = get_opt_i64(params, "totalInstallments");

    let payment_date = get_opt_str(params, "paymentDate")
        .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string());
    let payment_method = get_opt_str(params, "paymentMethod").unwrap_or_else(|| "cash".to_string());
    let notes = get_opt_str(params, "notes");
    let created_by = get_opt_str(params, "createdBy").unwrap_or_else(|| "admin".to_string());
    let year = get_opt_i64(params, "year")
        .unwrap_or_else(|| calendar_year_for(&academic_year.name, month));

    let receipt_number = generate_receipt_number(conn, &payment_date)?;

    conn.execute(
        "INSERT INTO payments(student_id, student_name, student_nis, class_name,
                              payment_type_id, payment_type_name, amount, month, year,
                              academic_year_id, payment_date, receipt_number, payment_method,
                              notes, created_by, is_installment, installment_of,
                              installment_number, total_installments, is_paid_off,
                              original_amount, remaining_amount, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            student_id,
            student.name,
            student.nis,
            student.class_name,
            payment_type_id,
            payment_type.name,
            amount,
            month,
            year,
            academic_year.id,
            payment_date,
            receipt_number,
            payment_method,
            notes,
            created_by,
            is_installment as i64,
            installment_of,
            installment_number,
            total_installments,
            is_paid_off as i64,
            original_amount,
            remaining_amount,
            store::now_iso()
        ],
    )
    .map_err(db_err("db_insert_failed"))?;
    let id = conn.last_insert_rowid();

    // Closing out an installment plan marks the earlier rows settled too.
    if is_paid_off {
        if let Some(root) = installment_of {
            conn.execute(
                "UPDATE payments SET is_paid_off = 1, remaining_amount = 0
                 WHERE id = ? OR installment_of = ?",
                (root, root),
            )
            .map_err(db_err("db_update_failed"))?;
        }
    }

    let payment = store::get_payment(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("payment not found after insert"))?;
    Ok(json!({ "payment": payment }))
}

fn payments_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let existing = store::get_payment(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("payment not found"))?;

    // Identity and snapshot columns are frozen; only bookkeeping fields move.
    let payment_date = get_opt_str(params, "paymentDate").unwrap_or(existing.payment_date);
    let payment_method = get_opt_str(params, "paymentMethod").unwrap_or(existing.payment_method);
    let notes = match params.get("notes") {
        Some(v) if v.is_null() => None,
        Some(v) => v.as_str().map(|s| s.to_string()),
        None => existing.notes,
    };
    let is_paid_off = get_opt_bool(params, "isPaidOff").unwrap_or(existing.is_paid_off);
    let remaining_amount = match params.get("remainingAmount") {
        Some(v) if v.is_null() => None,
        Some(v) => v.as_i64(),
        None => existing.remaining_amount,
    };

    conn.execute(
        "UPDATE payments SET payment_date = ?, payment_method = ?, notes = ?,
                is_paid_off = ?, remaining_amount = ?
         WHERE id = ?",
        rusqlite::params![
            payment_date,
            payment_method,
            notes,
            is_paid_off as i64,
            remaining_amount,
            id
        ],
    )
    .map_err(db_err("db_update_failed"))?;

    let payment = store::get_payment(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("payment not found"))?;
    Ok(json!({ "payment": payment }))
}

fn payments_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let deleted = conn
        .execute("DELETE FROM payments WHERE id = ?", [id])
        .map_err(db_err("db_delete_failed"))?;
    if deleted == 0 {
        return Err(HandlerErr::not_found("payment not found"));
    }
    Ok(json!({ "ok": true }))
}

fn payments_stats(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let month_prefix = chrono::Utc::now().format("%Y-%m").to_string();

    let sum_where = |clause: &str, args: &[&dyn ToSql]| -> Result<(i64, i64), HandlerErr> {
        conn.query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(SUM(amount), 0) FROM payments{}",
                clause
            ),
            args,
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)),
        )
        .map_err(db_err("db_query_failed"))
    };

    let (today_count, today_total) = sum_where(" WHERE payment_date = ?", &[&today as &dyn ToSql])?;
    let month_pattern = format!("{}%", month_prefix);
    let (month_count, month_total) =
        sum_where(" WHERE payment_date LIKE ?", &[&month_pattern as &dyn ToSql])?;

    // Optional filters narrow the overall totals and both breakdowns alike.
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();
    for (key, column) in [
        ("academicYearId", "academic_year_id"),
        ("month", "month"),
        ("year", "year"),
    ] {
        if let Some(v) = get_opt_i64(params, key) {
            clauses.push(format!("{} = ?{}", column, args.len() + 1));
            args.push(Box::new(v));
        }
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let arg_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();

    let (all_count, all_total) = sum_where(&where_sql, arg_refs.as_slice())?;

    let mut stmt = conn
        .prepare(&format!(
            "SELECT payment_method, COUNT(*), COALESCE(SUM(amount), 0)
             FROM payments{} GROUP BY payment_method",
            where_sql
        ))
        .map_err(db_err("db_query_failed"))?;
    let by_method = stmt
        .query_map(arg_refs.as_slice(), |r| {
            Ok(json!({
                "method": r.get::<_, String>(0)?,
                "count": r.get::<_, i64>(1)?,
                "total": r.get::<_, i64>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;

    let mut stmt = conn
        .prepare(&format!(
            "SELECT payment_type_id, payment_type_name, COUNT(*), COALESCE(SUM(amount), 0)
             FROM payments{} GROUP BY payment_type_id, payment_type_name",
            where_sql
        ))
        .map_err(db_err("db_query_failed"))?;
    let by_payment_type = stmt
        .query_map(arg_refs.as_slice(), |r| {
            Ok(json!({
                "paymentTypeId": r.get::<_, i64>(0)?,
                "paymentTypeName": r.get::<_, String>(1)?,
                "count": r.get::<_, i64>(2)?,
                "total": r.get::<_, i64>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;

    Ok(json!({
        "today": { "count": today_count, "total": today_total },
        "thisMonth": { "count": month_count, "total": month_total },
        "overall": { "count": all_count, "total": all_total },
        "byMethod": by_method,
        "byPaymentType": by_payment_type,
    }))
}

fn payments_receipt(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let payment = store::get_payment(conn, id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("payment not found"))?;
    let school = store::get_school_info(conn)
        .map_err(db_err("db_query_failed"))?
        .unwrap_or_else(receipt::default_school_info);

    let layout = get_opt_str(params, "layout").unwrap_or_else(|| "a4".to_string());
    let html = match layout.as_str() {
        "a4" => receipt::render_receipt_a4(&payment, &school),
        "thermal" => receipt::render_receipt_thermal(&payment, &school),
        other => {
            return Err(HandlerErr::bad_params(format!(
                "unknown layout: {} (expected a4 or thermal)",
                other
            )))
        }
    };
    Ok(json!({
        "receiptNumber": payment.receipt_number,
        "layout": layout,
        "html": html,
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
        "payments.list" => Some(dispatch(state, req, payments_list)),
        "payments.get" => Some(dispatch(state, req, payments_get)),
        "payments.listByStudent" => Some(dispatch(state, req, payments_list_by_student)),
        "payments.create" => Some(dispatch(state, req, payments_create)),
        "payments.update" => Some(dispatch(state, req, payments_update)),
        "payments.delete" => Some(dispatch(state, req, payments_delete)),
        "payments.stats" => Some(dispatch(state, req, payments_stats)),
        "payments.receipt" => Some(dispatch(state, req, payments_receipt)),
        _ => None,
    }
}
