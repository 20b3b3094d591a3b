mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_ok, spawn_sidecar, temp_dir};

struct Seed {
    spp_id: i64,
    payer_id: i64,
    debtor_id: i64,
}

fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &std::path::Path) -> Seed {
    let _ = request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-year",
        "academicYears.create",
        json!({
            "name": "2024/2025",
            "startDate": "2024-07-01",
            "endDate": "2025-06-30",
            "isActive": true
        }),
    );
    let spp = request_ok(
        stdin,
        reader,
        "seed-spp",
        "paymentTypes.create",
        json!({ "name": "SPP", "amount": 150000, "isRecurring": true }),
    );
    let spp_id = spp["paymentType"]["id"].as_i64().expect("type id");

    let payer = request_ok(
        stdin,
        reader,
        "seed-payer",
        "students.create",
        json!({ "nis": "2024001", "nisn": "0051111111", "name": "Ahmad Rizki", "gender": "L" }),
    );
    let payer_id = payer["student"]["id"].as_i64().expect("student id");
    let debtor = request_ok(
        stdin,
        reader,
        "seed-debtor",
        "students.create",
        json!({ "nis": "2024002", "nisn": "0052222222", "name": "Siti Aminah", "gender": "P" }),
    );
    let debtor_id = debtor["student"]["id"].as_i64().expect("student id");

    // The payer settles every month of the academic year up front.
    for (i, month) in (7..=12).chain(1..=6).enumerate() {
        let year = if month >= 7 { 2024 } else { 2025 };
        let _ = request_ok(
            stdin,
            reader,
            &format!("seed-pay-{}", i),
            "payments.create",
            json!({
                "studentId": payer_id,
                "paymentTypeId": spp_id,
                "amount": 150000,
                "month": month,
                "paymentDate": format!("{:04}-{:02}-05", year, month)
            }),
        );
    }

    Seed {
        spp_id,
        payer_id,
        debtor_id,
    }
}

#[test]
fn arrears_list_skips_settled_students_and_sorts_by_debt() {
    let workspace = temp_dir("spp-arrears");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed(&mut stdin, &mut reader, &workspace);

    let report = request_ok(&mut stdin, &mut reader, "1", "reports.arrears", json!({}));
    assert_eq!(report["paymentTypeId"].as_i64(), Some(seed.spp_id));
    assert_eq!(report["monthlyAmount"].as_i64(), Some(150000));

    let arrears = report["arrears"].as_array().expect("arrears array");
    assert_eq!(arrears.len(), 1, "only the debtor should be listed");
    let row = &arrears[0];
    assert_eq!(row["studentId"].as_i64(), Some(seed.debtor_id));

    // The exact debt depends on the current calendar month; it is always a
    // positive whole number of monthly amounts.
    let total_due = row["totalDue"].as_i64().expect("totalDue");
    assert!(total_due > 0);
    assert_eq!(total_due % 150000, 0);
    let unpaid = row["unpaidMonths"].as_array().expect("unpaidMonths");
    assert_eq!(unpaid.len() as i64 * 150000, total_due);
    assert_eq!(report["grandTotal"].as_i64(), Some(total_due));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn tracking_matrix_covers_the_full_academic_year() {
    let workspace = temp_dir("spp-tracking");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed(&mut stdin, &mut reader, &workspace);

    let report = request_ok(&mut stdin, &mut reader, "1", "reports.tracking", json!({}));
    assert_eq!(report["isRecurring"].as_bool(), Some(true));

    let months = report["months"].as_array().expect("months");
    assert_eq!(months.len(), 12);
    assert_eq!(months[0]["month"].as_i64(), Some(7));
    assert_eq!(months[0]["year"].as_i64(), Some(2024));
    assert_eq!(months[11]["month"].as_i64(), Some(6));
    assert_eq!(months[11]["year"].as_i64(), Some(2025));

    let students = report["students"].as_array().expect("students");
    assert_eq!(students.len(), 2);
    let payer = students
        .iter()
        .find(|s| s["studentId"].as_i64() == Some(seed.payer_id))
        .expect("payer row");
    assert_eq!(payer["paidMonths"].as_array().map(|a| a.len()), Some(12));
    assert_eq!(payer["unpaidMonths"].as_array().map(|a| a.len()), Some(0));
    assert_eq!(payer["totalPaid"].as_i64(), Some(12 * 150000));

    let debtor = students
        .iter()
        .find(|s| s["studentId"].as_i64() == Some(seed.debtor_id))
        .expect("debtor row");
    assert_eq!(debtor["unpaidMonths"].as_array().map(|a| a.len()), Some(12));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn ledger_runs_a_cumulative_balance_and_monthly_recap_groups_by_type() {
    let workspace = temp_dir("spp-ledger");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed(&mut stdin, &mut reader, &workspace);

    let ledger = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.ledger",
        json!({ "studentId": seed.payer_id }),
    );
    let entries = ledger["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 12);
    assert_eq!(entries[0]["balance"].as_i64(), Some(150000));
    assert_eq!(entries[11]["balance"].as_i64(), Some(12 * 150000));
    assert_eq!(ledger["total"].as_i64(), Some(12 * 150000));

    let recap = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.monthly",
        json!({ "month": 7, "year": 2024 }),
    );
    let by_type = recap["byType"].as_array().expect("byType");
    assert_eq!(by_type.len(), 1);
    assert_eq!(by_type[0]["paymentTypeName"].as_str(), Some("SPP"));
    assert_eq!(by_type[0]["count"].as_i64(), Some(1));
    assert_eq!(recap["grandTotal"].as_i64(), Some(150000));

    let csv_out = workspace.join("arrears.csv");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.exportArrearsCsv",
        json!({ "outPath": csv_out.to_string_lossy() }),
    );
    assert_eq!(exported["rows"].as_i64(), Some(1));
    let csv = std::fs::read_to_string(&csv_out).expect("read csv");
    assert!(csv.starts_with("NIS,Nama,Kelas,Bulan Tunggakan,Total Tunggakan"));
    assert!(csv.contains("Siti Aminah"));
    assert!(!csv.contains("Ahmad Rizki"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
