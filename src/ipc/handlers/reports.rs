use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_err, get_opt_i64, get_required_i64, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::status;
use crate::store;
use chrono::Datelike;
use rusqlite::Connection;
use serde_json::json;

fn resolve_academic_year(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<store::AcademicYear, HandlerErr> {
    match get_opt_i64(params, "academicYearId") {
        Some(id) => store::get_academic_year(conn, id)
            .map_err(db_err("db_query_failed"))?
            .ok_or_else(|| HandlerErr::not_found("academic year not found")),
        None => store::get_active_academic_year(conn)
            .map_err(db_err("db_query_failed"))?
            .ok_or_else(|| HandlerErr::bad_params("no active academic year; pass academicYearId")),
    }
}

fn resolve_tracked_type(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<store::PaymentType, HandlerErr> {
    if let Some(id) = get_opt_i64(params, "paymentTypeId") {
        return store::get_payment_type(conn, id)
            .map_err(db_err("db_query_failed"))?
            .ok_or_else(|| HandlerErr::not_found("payment type not found"));
    }
    let types = store::list_payment_types(conn).map_err(db_err("db_query_failed"))?;
    status::pick_tuition_type(&types, |t| t.name.as_str(), |t| t.is_recurring)
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("no recurring payment type configured"))
}

fn active_students(conn: &Connection) -> Result<Vec<store::Student>, HandlerErr> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM students WHERE status = 'active' ORDER BY name",
            store::STUDENT_COLS
        ))
        .map_err(db_err("db_query_failed"))?;
    stmt.query_map([], store::student_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))
}

struct ArrearsRow {
    student: store::Student,
    unpaid_months: Vec<u32>,
    total_due: i64,
}

/// Tuition arrears per active student, counted only for months that have
/// already started, heaviest debtors first.
fn collect_arrears(
    conn: &Connection,
    year: &store::AcademicYear,
    tuition: &store::PaymentType,
) -> Result<Vec<ArrearsRow>, HandlerErr> {
    let sequence = status::academic_month_sequence(&year.name, tuition.period_bounds().as_ref());
    let current_month = chrono::Utc::now().month();
    let checked = status::months_through_current(&sequence, current_month);

    let mut rows = Vec::new();
    for student in active_students(conn)? {
        let facts = store::payment_facts(conn, student.id, tuition.id, year.id)
            .map_err(db_err("db_query_failed"))?;
        let st = status::recurring_status(&facts, &checked, tuition.amount);
        if st.total_due > 0 {
            rows.push(ArrearsRow {
                student,
                unpaid_months: st.unpaid_months,
                total_due: st.total_due,
            });
        }
    }
    rows.sort_by(|a, b| b.total_due.cmp(&a.total_due));
    Ok(rows)
}

fn reports_arrears(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year = resolve_academic_year(conn, params)?;
    let tuition = resolve_tracked_type(conn, params)?;
    if !tuition.is_recurring {
        return Err(HandlerErr::bad_params(
            "arrears are tracked for recurring payment types only",
        ));
    }

    let rows = collect_arrears(conn, &year, &tuition)?;
    let grand_total: i64 = rows.iter().map(|r| r.total_due).sum();
    let arrears: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|r| {
            json!({
                "studentId": r.student.id,
                "nis": r.student.nis,
                "name": r.student.name,
                "className": r.student.class_name,
                "unpaidMonths": r.unpaid_months,
                "totalDue": r.total_due,
            })
        })
        .collect();

    Ok(json!({
        "academicYearId": year.id,
        "paymentTypeId": tuition.id,
        "monthlyAmount": tuition.amount,
        "arrears": arrears,
        "grandTotal": grand_total,
    }))
}

/// Per-student status matrix for one payment type across the whole year.
fn reports_tracking(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year = resolve_academic_year(conn, params)?;
    let tracked = resolve_tracked_type(conn, params)?;
    let sequence = status::academic_month_sequence(&year.name, tracked.period_bounds().as_ref());

    let mut rows = Vec::new();
    for student in active_students(conn)? {
        let facts = store::payment_facts(conn, student.id, tracked.id, year.id)
            .map_err(db_err("db_query_failed"))?;
        let entry = if tracked.is_recurring {
            let st = status::recurring_status(&facts, &sequence, tracked.amount);
            json!({
                "studentId": student.id,
                "nis": student.nis,
                "name": student.name,
                "className": student.class_name,
                "paidMonths": st.paid_months,
                "unpaidMonths": st.unpaid_months,
                "totalPaid": st.total_paid,
            })
        } else {
            let st = status::one_time_status(&facts, tracked.amount);
            json!({
                "studentId": student.id,
                "nis": student.nis,
                "name": student.name,
                "className": student.class_name,
                "isPaid": st.is_paid,
                "totalPaid": st.total_paid,
                "amountDue": st.amount_due,
            })
        };
        rows.push(entry);
    }

    Ok(json!({
        "academicYearId": year.id,
        "paymentTypeId": tracked.id,
        "isRecurring": tracked.is_recurring,
        "months": sequence,
        "students": rows,
    }))
}

/// Collections recap for one calendar month, grouped by payment type.
fn reports_monthly(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let month = get_required_i64(params, "month")?;
    let year = get_required_i64(params, "year")?;
    if !(1..=12).contains(&month) {
        return Err(HandlerErr::bad_params("month must be between 1 and 12"));
    }

    let prefix = format!("{:04}-{:02}%", year, month);
    let mut stmt = conn
        .prepare(
            "SELECT payment_type_id, payment_type_name, COUNT(*), COALESCE(SUM(amount), 0)
             FROM payments
             WHERE payment_date LIKE ?
             GROUP BY payment_type_id, payment_type_name
             ORDER BY payment_type_name",
        )
        .map_err(db_err("db_query_failed"))?;
    let groups = stmt
        .query_map([&prefix], |r| {
            Ok(json!({
                "paymentTypeId": r.get::<_, i64>(0)?,
                "paymentTypeName": r.get::<_, String>(1)?,
                "count": r.get::<_, i64>(2)?,
                "total": r.get::<_, i64>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;

    let grand_total: i64 = groups
        .iter()
        .filter_map(|g| g.get("total").and_then(|v| v.as_i64()))
        .sum();

    Ok(json!({
        "month": month,
        "year": year,
        "byType": groups,
        "grandTotal": grand_total,
    }))
}

/// One student's chronological payment ledger with a running balance.
fn reports_ledger(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let student = store::get_student(conn, student_id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;

    let payments = match get_opt_i64(params, "academicYearId") {
        Some(year_id) => {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM payments
                     WHERE student_id = ? AND academic_year_id = ?
                     ORDER BY payment_date, id",
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
                    "SELECT {} FROM payments WHERE student_id = ? ORDER BY payment_date, id",
                    store::PAYMENT_COLS
                ))
                .map_err(db_err("db_query_failed"))?;
            stmt.query_map([student_id], store::payment_from_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(db_err("db_query_failed"))?
        }
    };

    let balances = status::running_balance(payments.iter().map(|p| p.amount));
    let entries: Vec<serde_json::Value> = payments
        .iter()
        .zip(balances.iter())
        .map(|(p, balance)| {
            json!({
                "paymentId": p.id,
                "paymentDate": p.payment_date,
                "receiptNumber": p.receipt_number,
                "paymentTypeName": p.payment_type_name,
                "month": p.month,
                "amount": p.amount,
                "balance": balance,
            })
        })
        .collect();
    let total: i64 = balances.last().copied().unwrap_or(0);

    Ok(json!({
        "student": student,
        "entries": entries,
        "total": total,
    }))
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Writes the arrears list as a CSV file for the front office.
fn reports_export_arrears_csv(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let out_path = get_required_str(params, "outPath")?;
    let year = resolve_academic_year(conn, params)?;
    let tuition = resolve_tracked_type(conn, params)?;
    if !tuition.is_recurring {
        return Err(HandlerErr::bad_params(
            "arrears are tracked for recurring payment types only",
        ));
    }

    let rows = collect_arrears(conn, &year, &tuition)?;
    let mut csv = String::from("NIS,Nama,Kelas,Bulan Tunggakan,Total Tunggakan\n");
    for row in &rows {
        let months = row
            .unpaid_months
            .iter()
            .map(|m| crate::receipt::month_name(*m))
            .collect::<Vec<_>>()
            .join("; ");
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            csv_escape(&row.student.nis),
            csv_escape(&row.student.name),
            csv_escape(&row.student.class_name),
            csv_escape(&months),
            row.total_due
        ));
    }

    std::fs::write(&out_path, csv.as_bytes())
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;

    Ok(json!({
        "outPath": out_path,
        "rows": rows.len(),
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
        "reports.arrears" => Some(dispatch(state, req, reports_arrears)),
        "reports.tracking" => Some(dispatch(state, req, reports_tracking)),
        "reports.monthly" => Some(dispatch(state, req, reports_monthly)),
        "reports.ledger" => Some(dispatch(state, req, reports_ledger)),
        "reports.exportArrearsCsv" => Some(dispatch(state, req, reports_export_arrears_csv)),
        _ => None,
    }
}
