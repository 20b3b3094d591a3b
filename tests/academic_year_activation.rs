mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn activation_keeps_exactly_one_year_active() {
    let workspace = temp_dir("spp-year-activation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "academicYears.create",
        json!({
            "name": "2023/2024",
            "startDate": "2023-07-01",
            "endDate": "2024-06-30",
            "isActive": true
        }),
    );
    let first_id = first["academicYear"]["id"].as_i64().expect("year id");

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "academicYears.create",
        json!({
            "name": "2024/2025",
            "startDate": "2024-07-01",
            "endDate": "2025-06-30"
        }),
    );
    let second_id = second["academicYear"]["id"].as_i64().expect("year id");
    assert_eq!(second["academicYear"]["isActive"].as_bool(), Some(false));

    let active = request_ok(&mut stdin, &mut reader, "4", "academicYears.active", json!({}));
    assert_eq!(active["academicYear"]["id"].as_i64(), Some(first_id));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "academicYears.activate",
        json!({ "id": second_id }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "6", "academicYears.list", json!({}));
    let years = listed["academicYears"].as_array().expect("years array");
    assert_eq!(years.len(), 2);
    let active_count = years
        .iter()
        .filter(|y| y["isActive"].as_bool() == Some(true))
        .count();
    assert_eq!(active_count, 1);
    let active = request_ok(&mut stdin, &mut reader, "7", "academicYears.active", json!({}));
    assert_eq!(active["academicYear"]["id"].as_i64(), Some(second_id));

    let dup = request(
        &mut stdin,
        &mut reader,
        "8",
        "academicYears.create",
        json!({
            "name": "2024/2025",
            "startDate": "2024-07-01",
            "endDate": "2025-06-30"
        }),
    );
    assert_eq!(error_code(&dup), "duplicate_name");

    // Flipping a year active through update obeys the same single-active
    // rule as activate.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "8b",
        "academicYears.update",
        json!({ "id": first_id, "isActive": true }),
    );
    assert_eq!(updated["academicYear"]["isActive"].as_bool(), Some(true));
    let listed = request_ok(&mut stdin, &mut reader, "8c", "academicYears.list", json!({}));
    let years = listed["academicYears"].as_array().expect("years array");
    let active_count = years
        .iter()
        .filter(|y| y["isActive"].as_bool() == Some(true))
        .count();
    assert_eq!(active_count, 1);
    let active = request_ok(&mut stdin, &mut reader, "8d", "academicYears.active", json!({}));
    assert_eq!(active["academicYear"]["id"].as_i64(), Some(first_id));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "academicYears.delete",
        json!({ "id": first_id }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "10",
        "academicYears.get",
        json!({ "id": first_id }),
    );
    assert_eq!(error_code(&gone), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
