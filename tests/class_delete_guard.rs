mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn class_with_active_students_cannot_be_deleted() {
    let workspace = temp_dir("spp-class-guard");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "7A", "grade": 7 }),
    );
    let class_id = class["class"]["id"].as_i64().expect("class id");
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "nis": "2024001",
            "nisn": "0051111111",
            "name": "Ahmad Rizki",
            "gender": "L",
            "classId": class_id
        }),
    );
    let student_id = student["student"]["id"].as_i64().expect("student id");

    let blocked = request(
        &mut stdin,
        &mut reader,
        "4",
        "classes.delete",
        json!({ "id": class_id }),
    );
    assert_eq!(error_code(&blocked), "class_in_use");
    assert_eq!(
        blocked["error"]["details"]["activeStudents"].as_i64(),
        Some(1)
    );

    // A graduated student no longer blocks the delete.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.update",
        json!({ "id": student_id, "status": "graduated" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "classes.delete",
        json!({ "id": class_id }),
    );

    // The student row survives with the class link cleared.
    let survivor = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.get",
        json!({ "id": student_id }),
    );
    assert!(survivor["student"]["classId"].is_null());

    let listed = request_ok(&mut stdin, &mut reader, "8", "classes.list", json!({}));
    assert!(listed["classes"].as_array().expect("classes").is_empty());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn renaming_a_class_refreshes_student_snapshots() {
    let workspace = temp_dir("spp-class-rename");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "7A", "grade": 7 }),
    );
    let class_id = class["class"]["id"].as_i64().expect("class id");
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "nis": "2024001",
            "nisn": "0051111111",
            "name": "Ahmad Rizki",
            "gender": "L",
            "classId": class_id
        }),
    );
    let student_id = student["student"]["id"].as_i64().expect("student id");
    assert_eq!(student["student"]["className"].as_str(), Some("7A"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classes.update",
        json!({ "id": class_id, "name": "7B" }),
    );
    let refreshed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.get",
        json!({ "id": student_id }),
    );
    assert_eq!(refreshed["student"]["className"].as_str(), Some("7B"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
