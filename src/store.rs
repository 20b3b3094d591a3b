use crate::status::PaymentFact;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

/// Current timestamp in the ISO-8601 shape the exchange documents use.
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Callers supply limit/offset; the server clamps the limit per resource.
pub fn clamp_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, max)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: i64,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub is_active: bool,
    pub created_at: String,
}

pub const ACADEMIC_YEAR_COLS: &str = "id, name, start_date, end_date, is_active, created_at";

pub fn academic_year_from_row(row: &Row) -> rusqlite::Result<AcademicYear> {
    Ok(AcademicYear {
        id: row.get(0)?,
        name: row.get(1)?,
        start_date: row.get(2)?,
        end_date: row.get(3)?,
        is_active: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
    })
}

pub fn get_academic_year(conn: &Connection, id: i64) -> rusqlite::Result<Option<AcademicYear>> {
    conn.query_row(
        &format!("SELECT {} FROM academic_years WHERE id = ?", ACADEMIC_YEAR_COLS),
        [id],
        academic_year_from_row,
    )
    .optional()
}

pub fn get_active_academic_year(conn: &Connection) -> rusqlite::Result<Option<AcademicYear>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM academic_years WHERE is_active = 1 LIMIT 1",
            ACADEMIC_YEAR_COLS
        ),
        [],
        academic_year_from_row,
    )
    .optional()
}

pub fn academic_year_name_exists(
    conn: &Connection,
    name: &str,
    exclude_id: Option<i64>,
) -> rusqlite::Result<bool> {
    match exclude_id {
        Some(id) => conn
            .query_row(
                "SELECT 1 FROM academic_years WHERE name = ? AND id != ?",
                (name, id),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map(|v| v.is_some()),
        None => conn
            .query_row(
                "SELECT 1 FROM academic_years WHERE name = ?",
                [name],
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map(|v| v.is_some()),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: i64,
    pub name: String,
    pub grade: i64,
    pub academic_year_id: Option<i64>,
    pub created_at: String,
}

pub const CLASS_COLS: &str = "id, name, grade, academic_year_id, created_at";

pub fn class_from_row(row: &Row) -> rusqlite::Result<ClassInfo> {
    Ok(ClassInfo {
        id: row.get(0)?,
        name: row.get(1)?,
        grade: row.get(2)?,
        academic_year_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn get_class(conn: &Connection, id: i64) -> rusqlite::Result<Option<ClassInfo>> {
    conn.query_row(
        &format!("SELECT {} FROM classes WHERE id = ?", CLASS_COLS),
        [id],
        class_from_row,
    )
    .optional()
}

pub fn count_active_students_in_class(conn: &Connection, class_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM students WHERE class_id = ? AND status = 'active'",
        [class_id],
        |r| r.get(0),
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub nis: String,
    pub nisn: String,
    pub name: String,
    pub gender: String,
    pub class_id: Option<i64>,
    pub class_name: String,
    pub birth_place: String,
    pub birth_date: String,
    pub address: String,
    pub parent_name: String,
    pub parent_phone: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

pub const STUDENT_COLS: &str = "id, nis, nisn, name, gender, class_id, class_name, birth_place, \
                                birth_date, address, parent_name, parent_phone, status, \
                                created_at, updated_at";

pub fn student_from_row(row: &Row) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        nis: row.get(1)?,
        nisn: row.get(2)?,
        name: row.get(3)?,
        gender: row.get(4)?,
        class_id: row.get(5)?,
        class_name: row.get(6)?,
        birth_place: row.get(7)?,
        birth_date: row.get(8)?,
        address: row.get(9)?,
        parent_name: row.get(10)?,
        parent_phone: row.get(11)?,
        status: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

pub fn get_student(conn: &Connection, id: i64) -> rusqlite::Result<Option<Student>> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLS),
        [id],
        student_from_row,
    )
    .optional()
}

pub fn student_nis_exists(
    conn: &Connection,
    nis: &str,
    exclude_id: Option<i64>,
) -> rusqlite::Result<bool> {
    unique_field_exists(conn, "nis", nis, exclude_id)
}

pub fn student_nisn_exists(
    conn: &Connection,
    nisn: &str,
    exclude_id: Option<i64>,
) -> rusqlite::Result<bool> {
    unique_field_exists(conn, "nisn", nisn, exclude_id)
}

fn unique_field_exists(
    conn: &Connection,
    column: &str,
    value: &str,
    exclude_id: Option<i64>,
) -> rusqlite::Result<bool> {
    match exclude_id {
        Some(id) => conn
            .query_row(
                &format!("SELECT 1 FROM students WHERE {} = ? AND id != ?", column),
                (value, id),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map(|v| v.is_some()),
        None => conn
            .query_row(
                &format!("SELECT 1 FROM students WHERE {} = ?", column),
                [value],
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map(|v| v.is_some()),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentType {
    pub id: i64,
    pub name: String,
    pub amount: i64,
    pub is_recurring: bool,
    pub allow_installment: bool,
    pub description: Option<String>,
    pub from_month: Option<i64>,
    pub from_year: Option<i64>,
    pub to_month: Option<i64>,
    pub to_year: Option<i64>,
    pub created_at: String,
}

pub const PAYMENT_TYPE_COLS: &str = "id, name, amount, is_recurring, allow_installment, \
                                     description, from_month, from_year, to_month, to_year, \
                                     created_at";

pub fn payment_type_from_row(row: &Row) -> rusqlite::Result<PaymentType> {
    Ok(PaymentType {
        id: row.get(0)?,
        name: row.get(1)?,
        amount: row.get(2)?,
        is_recurring: row.get::<_, i64>(3)? != 0,
        allow_installment: row.get::<_, i64>(4)? != 0,
        description: row.get(5)?,
        from_month: row.get(6)?,
        from_year: row.get(7)?,
        to_month: row.get(8)?,
        to_year: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl PaymentType {
    /// Bounds are honored only when all four fields are present.
    pub fn period_bounds(&self) -> Option<crate::status::PeriodBounds> {
        Some(crate::status::PeriodBounds {
            from_month: self.from_month? as u32,
            from_year: self.from_year? as i32,
            to_month: self.to_month? as u32,
            to_year: self.to_year? as i32,
        })
    }
}

pub fn get_payment_type(conn: &Connection, id: i64) -> rusqlite::Result<Option<PaymentType>> {
    conn.query_row(
        &format!("SELECT {} FROM payment_types WHERE id = ?", PAYMENT_TYPE_COLS),
        [id],
        payment_type_from_row,
    )
    .optional()
}

pub fn list_payment_types(conn: &Connection) -> rusqlite::Result<Vec<PaymentType>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM payment_types ORDER BY id",
        PAYMENT_TYPE_COLS
    ))?;
    let rows = stmt.query_map([], payment_type_from_row)?;
    rows.collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub student_nis: String,
    pub class_name: String,
    pub payment_type_id: i64,
    pub payment_type_name: String,
    pub amount: i64,
    pub month: Option<i64>,
    pub year: i64,
    pub academic_year_id: i64,
    pub payment_date: String,
    pub receipt_number: String,
    pub payment_method: String,
    pub notes: Option<String>,
    pub created_by: String,
    pub is_installment: bool,
    pub installment_of: Option<i64>,
    pub installment_number: Option<i64>,
    pub total_installments: Option<i64>,
    pub is_paid_off: bool,
    pub original_amount: Option<i64>,
    pub remaining_amount: Option<i64>,
    pub created_at: String,
}

pub const PAYMENT_COLS: &str = "id, student_id, student_name, student_nis, class_name, \
                                payment_type_id, payment_type_name, amount, month, year, \
                                academic_year_id, payment_date, receipt_number, payment_method, \
                                notes, created_by, is_installment, installment_of, \
                                installment_number, total_installments, is_paid_off, \
                                original_amount, remaining_amount, created_at";

pub fn payment_from_row(row: &Row) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        student_id: row.get(1)?,
        student_name: row.get(2)?,
        student_nis: row.get(3)?,
        class_name: row.get(4)?,
        payment_type_id: row.get(5)?,
        payment_type_name: row.get(6)?,
        amount: row.get(7)?,
        month: row.get(8)?,
        year: row.get(9)?,
        academic_year_id: row.get(10)?,
        payment_date: row.get(11)?,
        receipt_number: row.get(12)?,
        payment_method: row.get(13)?,
        notes: row.get(14)?,
        created_by: row.get(15)?,
        is_installment: row.get::<_, i64>(16)? != 0,
        installment_of: row.get(17)?,
        installment_number: row.get(18)?,
        total_installments: row.get(19)?,
        is_paid_off: row.get::<_, i64>(20)? != 0,
        original_amount: row.get(21)?,
        remaining_amount: row.get(22)?,
        created_at: row.get(23)?,
    })
}

pub fn get_payment(conn: &Connection, id: i64) -> rusqlite::Result<Option<Payment>> {
    conn.query_row(
        &format!("SELECT {} FROM payments WHERE id = ?", PAYMENT_COLS),
        [id],
        payment_from_row,
    )
    .optional()
}

/// Engine-facing snapshot of one student's payments toward one fee type in
/// one academic year.
pub fn payment_facts(
    conn: &Connection,
    student_id: i64,
    payment_type_id: i64,
    academic_year_id: i64,
) -> rusqlite::Result<Vec<PaymentFact>> {
    let mut stmt = conn.prepare(
        "SELECT month, is_installment, is_paid_off, amount
         FROM payments
         WHERE student_id = ? AND payment_type_id = ? AND academic_year_id = ?",
    )?;
    let rows = stmt.query_map((student_id, payment_type_id, academic_year_id), |r| {
        Ok(PaymentFact {
            month: r.get::<_, Option<i64>>(0)?.map(|m| m as u32),
            is_installment: r.get::<_, i64>(1)? != 0,
            is_paid_off: r.get::<_, i64>(2)? != 0,
            amount: r.get(3)?,
        })
    })?;
    rows.collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolInfo {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub principal_name: String,
    pub npsn: String,
    pub logo: Option<String>,
    pub updated_at: String,
}

pub const SCHOOL_INFO_COLS: &str =
    "id, name, address, phone, email, principal_name, npsn, logo, updated_at";

pub fn school_info_from_row(row: &Row) -> rusqlite::Result<SchoolInfo> {
    Ok(SchoolInfo {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        principal_name: row.get(5)?,
        npsn: row.get(6)?,
        logo: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn get_school_info(conn: &Connection) -> rusqlite::Result<Option<SchoolInfo>> {
    conn.query_row(
        &format!("SELECT {} FROM school_info LIMIT 1", SCHOOL_INFO_COLS),
        [],
        school_info_from_row,
    )
    .optional()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSettings {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub app_name: String,
    pub app_logo: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub const ADMIN_SETTINGS_COLS: &str =
    "id, username, password, app_name, app_logo, created_at, updated_at";

pub fn admin_settings_from_row(row: &Row) -> rusqlite::Result<AdminSettings> {
    Ok(AdminSettings {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        app_name: row.get(3)?,
        app_logo: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// The settings row is created on demand with the stock credentials so the
/// login gate always has something to compare against.
pub fn get_or_create_admin_settings(conn: &Connection) -> rusqlite::Result<AdminSettings> {
    let existing = conn
        .query_row(
            &format!("SELECT {} FROM admin_settings LIMIT 1", ADMIN_SETTINGS_COLS),
            [],
            admin_settings_from_row,
        )
        .optional()?;
    if let Some(settings) = existing {
        return Ok(settings);
    }
    let now = now_iso();
    conn.execute(
        "INSERT INTO admin_settings(username, password, app_name, app_logo, created_at, updated_at)
         VALUES('admin', 'gorengan123', 'SPP Manager', NULL, ?, ?)",
        (&now, &now),
    )?;
    let id = conn.last_insert_rowid();
    Ok(AdminSettings {
        id,
        username: "admin".to_string(),
        password: "gorengan123".to_string(),
        app_name: "SPP Manager".to_string(),
        app_logo: None,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Wipe order matters: payments reference everything, students reference
/// classes, classes reference academic years. Admin settings survive a wipe.
pub const CLEAR_ORDER: &[(&str, &str)] = &[
    ("payments", "payments"),
    ("students", "students"),
    ("paymentTypes", "payment_types"),
    ("classes", "classes"),
    ("academicYears", "academic_years"),
    ("schoolInfo", "school_info"),
];

pub struct ClearOutcome {
    pub cleared: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub fn clear_all_tables(conn: &Connection) -> ClearOutcome {
    let mut cleared = Vec::new();
    let mut failed = Vec::new();
    for (label, table) in CLEAR_ORDER {
        match conn.execute(&format!("DELETE FROM {}", table), []) {
            Ok(_) => cleared.push(label.to_string()),
            Err(e) => failed.push((label.to_string(), e.to_string())),
        }
    }
    ClearOutcome { cleared, failed }
}

/// Reset autoincrement counters so re-imported data gets clean sequential
/// ids. sqlite_sequence only exists once an AUTOINCREMENT insert happened.
pub fn reset_sequences(conn: &Connection) {
    let _ = conn.execute(
        "DELETE FROM sqlite_sequence WHERE name IN
         ('payments', 'students', 'payment_types', 'classes', 'academic_years', 'school_info')",
        [],
    );
}
