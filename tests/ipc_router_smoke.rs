mod test_support;

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("spp-router-smoke");
    let bundle_out = workspace.join("smoke-backup.sppbundle.zip");
    let csv_out = workspace.join("smoke-arrears.csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").is_some());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let year = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "academicYears.create",
        json!({
            "name": "2024/2025",
            "startDate": "2024-07-01",
            "endDate": "2025-06-30",
            "isActive": true
        }),
    );
    let year_id = year["academicYear"]["id"].as_i64().expect("year id");

    let class = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classes.create",
        json!({ "name": "7A", "grade": 7, "academicYearId": year_id }),
    );
    let class_id = class["class"]["id"].as_i64().expect("class id");
    let _ = request_ok(&mut stdin, &mut reader, "5", "classes.list", json!({}));

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({
            "nis": "2024001",
            "nisn": "0051234567",
            "name": "Ahmad Rizki",
            "gender": "L",
            "classId": class_id
        }),
    );
    let student_id = student["student"]["id"].as_i64().expect("student id");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.list",
        json!({ "classId": class_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.update",
        json!({ "id": student_id, "parentName": "Budi Rizki" }),
    );

    let spp = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "paymentTypes.create",
        json!({ "name": "SPP", "amount": 150000, "isRecurring": true }),
    );
    let spp_id = spp["paymentType"]["id"].as_i64().expect("type id");
    let _ = request_ok(&mut stdin, &mut reader, "10", "paymentTypes.list", json!({}));

    let payment = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "payments.create",
        json!({
            "studentId": student_id,
            "paymentTypeId": spp_id,
            "amount": 150000,
            "month": 7,
            "paymentDate": "2024-07-05"
        }),
    );
    let payment_id = payment["payment"]["id"].as_i64().expect("payment id");

    let _ = request_ok(&mut stdin, &mut reader, "12", "payments.list", json!({}));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "payments.listByStudent",
        json!({ "studentId": student_id }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "14", "payments.stats", json!({}));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "payments.receipt",
        json!({ "id": payment_id }),
    );

    let _ = request_ok(&mut stdin, &mut reader, "16", "reports.arrears", json!({}));
    let _ = request_ok(&mut stdin, &mut reader, "17", "reports.tracking", json!({}));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "reports.monthly",
        json!({ "month": 7, "year": 2024 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "reports.ledger",
        json!({ "studentId": student_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "20",
        "reports.exportArrearsCsv",
        json!({ "outPath": csv_out.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "21",
        "schoolInfo.set",
        json!({ "name": "SMP Negeri 1" }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "22", "schoolInfo.get", json!({}));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "23",
        "admin.login",
        json!({ "username": "admin", "password": "gorengan123" }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "24", "admin.getSettings", json!({}));

    let _ = request_ok(&mut stdin, &mut reader, "25", "database.export", json!({}));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "26",
        "backup.exportBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "27",
        "backup.importBundle",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );

    let unknown = request(&mut stdin, &mut reader, "28", "nope.method", json!({}));
    assert_eq!(unknown["ok"].as_bool(), Some(false));
    assert_eq!(test_support::error_code(&unknown), "not_implemented");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
