use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "sppmanager.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_years(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            grade INTEGER NOT NULL,
            academic_year_id INTEGER,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_academic_year ON classes(academic_year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nis TEXT NOT NULL UNIQUE,
            nisn TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            gender TEXT NOT NULL,
            class_id INTEGER,
            class_name TEXT NOT NULL,
            birth_place TEXT NOT NULL,
            birth_date TEXT NOT NULL,
            address TEXT NOT NULL,
            parent_name TEXT NOT NULL,
            parent_phone TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_status ON students(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payment_types(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            amount INTEGER NOT NULL,
            is_recurring INTEGER NOT NULL DEFAULT 0,
            allow_installment INTEGER NOT NULL DEFAULT 0,
            description TEXT,
            from_month INTEGER,
            from_year INTEGER,
            to_month INTEGER,
            to_year INTEGER,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Payments are immutable event records with a display snapshot frozen at
    // write time. No FOREIGN KEY clauses: rows must outlive the student/type/
    // year they reference, and import remapping is best-effort.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            student_name TEXT NOT NULL,
            student_nis TEXT NOT NULL,
            class_name TEXT NOT NULL,
            payment_type_id INTEGER NOT NULL,
            payment_type_name TEXT NOT NULL,
            amount INTEGER NOT NULL,
            month INTEGER,
            year INTEGER NOT NULL,
            academic_year_id INTEGER NOT NULL,
            payment_date TEXT NOT NULL,
            receipt_number TEXT NOT NULL UNIQUE,
            payment_method TEXT NOT NULL,
            notes TEXT,
            created_by TEXT NOT NULL,
            is_installment INTEGER NOT NULL DEFAULT 0,
            installment_of INTEGER,
            installment_number INTEGER,
            total_installments INTEGER,
            is_paid_off INTEGER NOT NULL DEFAULT 0,
            original_amount INTEGER,
            remaining_amount INTEGER,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_student ON payments(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_type_year
         ON payments(payment_type_id, academic_year_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_date ON payments(payment_date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_info(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            address TEXT NOT NULL,
            phone TEXT NOT NULL,
            email TEXT NOT NULL,
            principal_name TEXT NOT NULL,
            npsn TEXT NOT NULL,
            logo TEXT,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admin_settings(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            password TEXT NOT NULL,
            app_name TEXT NOT NULL,
            app_logo TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // Existing workspaces may predate the billing-period bounds on payment
    // types. Add the columns if needed.
    ensure_payment_type_period_columns(&conn)?;
    ensure_payments_installment_of(&conn)?;

    Ok(conn)
}

fn ensure_payment_type_period_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "payment_types", "from_month")? {
        conn.execute("ALTER TABLE payment_types ADD COLUMN from_month INTEGER", [])?;
    }
    if !table_has_column(conn, "payment_types", "from_year")? {
        conn.execute("ALTER TABLE payment_types ADD COLUMN from_year INTEGER", [])?;
    }
    if !table_has_column(conn, "payment_types", "to_month")? {
        conn.execute("ALTER TABLE payment_types ADD COLUMN to_month INTEGER", [])?;
    }
    if !table_has_column(conn, "payment_types", "to_year")? {
        conn.execute("ALTER TABLE payment_types ADD COLUMN to_year INTEGER", [])?;
    }
    Ok(())
}

fn ensure_payments_installment_of(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "payments", "installment_of")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE payments ADD COLUMN installment_of INTEGER", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
