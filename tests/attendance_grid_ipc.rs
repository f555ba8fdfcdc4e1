mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, seed_group, spawn_sidecar, temp_dir};

const WEEKDAYS: [&str; 5] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];

#[test]
fn dragged_rectangle_applies_one_status_to_every_cell() {
    let workspace = temp_dir("classbook-grid-rect");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_group(&mut stdin, &mut reader, &workspace, &WEEKDAYS, 5);

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "grid.open",
        json!({ "groupId": "g1", "month": "2024-09" }),
    );
    let dates = opened["dates"].as_array().expect("dates").clone();
    assert_eq!(dates.len(), 21);
    assert_eq!(dates[0], "2024-09-02");
    assert_eq!(opened["students"].as_array().map(|a| a.len()), Some(5));

    // drag bottom-right to top-left; the rectangle is the same either way
    let down = request_ok(
        &mut stdin,
        &mut reader,
        "down",
        "grid.pointerDown",
        json!({ "row": 4, "col": 4 }),
    );
    assert_eq!(down["accepted"], true);
    request_ok(
        &mut stdin,
        &mut reader,
        "enter",
        "grid.pointerEnter",
        json!({ "row": 0, "col": 0 }),
    );
    request_ok(&mut stdin, &mut reader, "up", "grid.pointerUp", json!({}));

    let applied = request_ok(&mut stdin, &mut reader, "key", "grid.key", json!({ "key": "a" }));
    assert_eq!(applied["edits"].as_array().map(|a| a.len()), Some(25));
    assert_eq!(applied["changed"], 25);

    let view = request_ok(&mut stdin, &mut reader, "state", "grid.state", json!({}));
    for row in view["cells"].as_array().expect("cells") {
        let row = row.as_array().expect("row");
        for (col, status) in row.iter().enumerate() {
            let expected = if col < 5 { "absent" } else { "pending" };
            assert_eq!(status, expected, "col {}", col);
        }
    }
    // as of 2024-10-01 every September date counts, none of them present
    assert_eq!(view["rowPercents"][0]["percent"], 0);
    assert_eq!(view["rowPercents"][0]["total"], 21);

    // the same key again writes nothing new
    let again = request_ok(&mut stdin, &mut reader, "key2", "grid.key", json!({ "key": "A" }));
    assert_eq!(again["changed"], 0);

    // right click clears only that cell
    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "ctx",
        "grid.contextMenu",
        json!({ "row": 2, "col": 2 }),
    );
    assert_eq!(cleared["changed"], 1);
    assert_eq!(cleared["edits"][0]["studentId"], "s3");
    assert_eq!(cleared["edits"][0]["date"], "2024-09-04");
    assert_eq!(cleared["edits"][0]["status"], "pending");

    let status = request_ok(
        &mut stdin,
        &mut reader,
        "get",
        "attendance.get",
        json!({ "groupId": "g1", "studentId": "s3", "date": "2024-09-04" }),
    );
    assert_eq!(status["status"], "pending");

    let ignored = request_ok(&mut stdin, &mut reader, "noop", "grid.key", json!({ "key": "F5" }));
    assert_eq!(ignored["ignored"], true);
}

#[test]
fn focus_moves_are_clamped_and_out_of_range_clicks_refused() {
    let workspace = temp_dir("classbook-grid-focus");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_group(&mut stdin, &mut reader, &workspace, &WEEKDAYS, 2);

    request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "grid.open",
        json!({ "groupId": "g1", "month": "2024-09" }),
    );
    let refused = request_ok(
        &mut stdin,
        &mut reader,
        "down-oob",
        "grid.pointerDown",
        json!({ "row": 9, "col": 0 }),
    );
    assert_eq!(refused["accepted"], false);

    request_ok(
        &mut stdin,
        &mut reader,
        "down",
        "grid.pointerDown",
        json!({ "row": 0, "col": 0 }),
    );
    request_ok(&mut stdin, &mut reader, "up", "grid.pointerUp", json!({}));
    let moved = request_ok(&mut stdin, &mut reader, "k1", "grid.key", json!({ "key": "ArrowUp" }));
    assert_eq!(moved["controller"]["focused"], json!({ "row": 0, "col": 0 }));

    let closed = request_ok(&mut stdin, &mut reader, "close", "grid.close", json!({}));
    assert_eq!(closed["closed"], true);
    let code = request_err(&mut stdin, &mut reader, "after", "grid.state", json!({}));
    assert_eq!(code, "no_session");
}

#[test]
fn roster_change_closes_open_grid() {
    let workspace = temp_dir("classbook-grid-roster");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_group(&mut stdin, &mut reader, &workspace, &WEEKDAYS, 2);

    request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "grid.open",
        json!({ "groupId": "g1", "scope": 1 }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "add",
        "students.add",
        json!({ "groupId": "g1", "id": "s9", "name": "Late Joiner" }),
    );
    let code = request_err(&mut stdin, &mut reader, "key", "grid.key", json!({ "key": "p" }));
    assert_eq!(code, "no_session");
}

#[test]
fn bulk_set_reports_rejected_records_by_index() {
    let workspace = temp_dir("classbook-bulk");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_group(&mut stdin, &mut reader, &workspace, &WEEKDAYS, 2);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "bulk",
        "attendance.bulkSet",
        json!({ "groupId": "g1", "records": [
            { "studentId": "s1", "date": "2024-09-02", "status": "present" },
            { "studentId": "ghost", "date": "2024-09-02", "status": "present" },
            { "studentId": "s2", "date": "not-a-date", "status": "present" },
            { "studentId": "s2", "date": "2024-09-02", "status": "sleeping" },
            { "studentId": "s2", "date": "2024-09-02", "status": "late" }
        ] }),
    );
    assert_eq!(result["applied"], 2);
    assert_eq!(result["changed"], 2);
    let rejected: Vec<u64> = result["rejected"]
        .as_array()
        .expect("rejected")
        .iter()
        .filter_map(|r| r["index"].as_u64())
        .collect();
    assert_eq!(rejected, vec![1, 2, 3]);
    assert_eq!(result["rejected"][0]["code"], "not_found");
}

#[test]
fn recorded_gated_policy_ignores_exchange_days() {
    let workspace = temp_dir("classbook-policy-b");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_group(&mut stdin, &mut reader, &workspace, &WEEKDAYS, 1);

    request_ok(
        &mut stdin,
        &mut reader,
        "bulk",
        "attendance.bulkSet",
        json!({ "groupId": "g1", "records": [
            { "studentId": "s1", "date": "2024-09-02", "status": "present" },
            { "studentId": "s1", "date": "2024-09-03", "status": "absent" },
            { "studentId": "s1", "date": "2024-09-04", "status": "exchange" }
        ] }),
    );
    let b = request_ok(
        &mut stdin,
        &mut reader,
        "b",
        "attendance.percent",
        json!({ "groupId": "g1", "studentId": "s1", "policy": "B", "month": "2024-09" }),
    );
    assert_eq!(b["attendance"]["percent"], 50);
    assert_eq!(b["attendance"]["total"], 2);

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "b-empty",
        "attendance.percent",
        json!({ "groupId": "g1", "studentId": "s1", "policy": "B", "month": "2024-11" }),
    );
    assert_eq!(empty["attendance"]["percent"], 100);
    assert_eq!(empty["attendance"]["hasData"], false);
}

#[test]
fn partial_rectangle_leaves_other_cells_untouched() {
    let workspace = temp_dir("classbook-grid-partial-rect");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_group(&mut stdin, &mut reader, &workspace, &WEEKDAYS, 5);

    request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "grid.open",
        json!({ "groupId": "g1", "month": "2024-09" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "down",
        "grid.pointerDown",
        json!({ "row": 1, "col": 0 }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "enter",
        "grid.pointerEnter",
        json!({ "row": 3, "col": 2 }),
    );
    request_ok(&mut stdin, &mut reader, "up", "grid.pointerUp", json!({}));
    let applied = request_ok(&mut stdin, &mut reader, "key", "grid.key", json!({ "key": "p" }));
    assert_eq!(applied["changed"], 9);

    let view = request_ok(&mut stdin, &mut reader, "state", "grid.state", json!({}));
    let cells = view["cells"].as_array().expect("cells");
    for (row, statuses) in cells.iter().enumerate() {
        for (col, status) in statuses.as_array().expect("row").iter().enumerate() {
            let inside = (1..=3).contains(&row) && col <= 2;
            let expected = if inside { "present" } else { "pending" };
            assert_eq!(status, expected, "cell ({}, {})", row, col);
        }
    }
}
