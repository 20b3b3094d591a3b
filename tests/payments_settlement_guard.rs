mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

fn seed_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &std::path::Path,
) -> i64 {
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
    let student = request_ok(
        stdin,
        reader,
        "seed-student",
        "students.create",
        json!({ "nis": "2024001", "nisn": "0051111111", "name": "Ahmad Rizki", "gender": "L" }),
    );
    student["student"]["id"].as_i64().expect("student id")
}

#[test]
fn settled_month_cannot_be_paid_twice() {
    let workspace = temp_dir("spp-month-guard");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let student_id = seed_workspace(&mut stdin, &mut reader, &workspace);

    let spp = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "paymentTypes.create",
        json!({ "name": "SPP", "amount": 150000, "isRecurring": true }),
    );
    let spp_id = spp["paymentType"]["id"].as_i64().expect("type id");

    let paid = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": spp_id,
            "amount": 150000,
            "month": 7,
            "paymentDate": "2024-07-05"
        }),
    );
    let receipt_number = paid["payment"]["receiptNumber"].as_str().expect("receipt");
    assert!(
        receipt_number.starts_with("KWT/20240705/"),
        "unexpected receipt number {}",
        receipt_number
    );
    assert_eq!(receipt_number.len(), "KWT/20240705/123456".len());
    // July lands in the first half of a 2024/2025 year.
    assert_eq!(paid["payment"]["year"].as_i64(), Some(2024));

    let again = request(
        &mut stdin,
        &mut reader,
        "3",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": spp_id,
            "amount": 150000,
            "month": 7,
            "paymentDate": "2024-07-20"
        }),
    );
    assert_eq!(error_code(&again), "month_already_settled");

    // A different month is fine, and a January payment carries the end year.
    let january = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": spp_id,
            "amount": 150000,
            "month": 1,
            "paymentDate": "2025-01-10"
        }),
    );
    assert_eq!(january["payment"]["year"].as_i64(), Some(2025));

    let no_month = request(
        &mut stdin,
        &mut reader,
        "5",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": spp_id,
            "amount": 150000,
            "paymentDate": "2024-08-01"
        }),
    );
    assert_eq!(error_code(&no_month), "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn installments_accumulate_until_the_plan_closes() {
    let workspace = temp_dir("spp-installments");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let student_id = seed_workspace(&mut stdin, &mut reader, &workspace);

    let building = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "paymentTypes.create",
        json!({
            "name": "Uang Gedung",
            "amount": 300000,
            "isRecurring": false,
            "allowInstallment": true
        }),
    );
    let type_id = building["paymentType"]["id"].as_i64().expect("type id");

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": type_id,
            "amount": 100000,
            "isInstallment": true,
            "paymentDate": "2024-07-05"
        }),
    );
    let root_id = first["payment"]["id"].as_i64().expect("payment id");
    assert_eq!(first["payment"]["remainingAmount"].as_i64(), Some(200000));
    assert_eq!(first["payment"]["installmentNumber"].as_i64(), Some(1));
    assert_eq!(first["payment"]["isPaidOff"].as_bool(), Some(false));

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": type_id,
            "amount": 100000,
            "isInstallment": true,
            "installmentOf": root_id,
            "paymentDate": "2024-08-05"
        }),
    );
    assert_eq!(second["payment"]["remainingAmount"].as_i64(), Some(100000));
    assert_eq!(second["payment"]["installmentNumber"].as_i64(), Some(2));

    let last = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": type_id,
            "amount": 100000,
            "isInstallment": true,
            "installmentOf": root_id,
            "paymentDate": "2024-09-05"
        }),
    );
    assert_eq!(last["payment"]["remainingAmount"].as_i64(), Some(0));
    assert_eq!(last["payment"]["isPaidOff"].as_bool(), Some(true));

    // Closing the plan marks the earlier rows settled too.
    let root = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "payments.get",
        json!({ "id": root_id }),
    );
    assert_eq!(root["payment"]["isPaidOff"].as_bool(), Some(true));
    assert_eq!(root["payment"]["remainingAmount"].as_i64(), Some(0));

    let extra = request(
        &mut stdin,
        &mut reader,
        "6",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": type_id,
            "amount": 100000,
            "paymentDate": "2024-10-05"
        }),
    );
    assert_eq!(error_code(&extra), "already_settled");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn one_time_fee_with_month_is_rejected() {
    let workspace = temp_dir("spp-one-time");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let student_id = seed_workspace(&mut stdin, &mut reader, &workspace);

    let uniform = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "paymentTypes.create",
        json!({ "name": "Seragam", "amount": 275000, "isRecurring": false }),
    );
    let type_id = uniform["paymentType"]["id"].as_i64().expect("type id");

    let with_month = request(
        &mut stdin,
        &mut reader,
        "2",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": type_id,
            "amount": 275000,
            "month": 7,
            "paymentDate": "2024-07-05"
        }),
    );
    assert_eq!(error_code(&with_month), "bad_params");

    // Installments on a type that forbids them are refused.
    let no_plan = request(
        &mut stdin,
        &mut reader,
        "2b",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": type_id,
            "amount": 100000,
            "isInstallment": true,
            "paymentDate": "2024-07-04"
        }),
    );
    assert_eq!(error_code(&no_plan), "bad_params");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": type_id,
            "amount": 275000,
            "paymentDate": "2024-07-05"
        }),
    );
    let twice = request(
        &mut stdin,
        &mut reader,
        "4",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": type_id,
            "amount": 275000,
            "paymentDate": "2024-07-06"
        }),
    );
    assert_eq!(error_code(&twice), "already_settled");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
