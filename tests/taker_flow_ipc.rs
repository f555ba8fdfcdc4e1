mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, seed_group, spawn_sidecar, temp_dir};

#[test]
fn four_students_are_marked_in_roster_order() {
    let workspace = temp_dir("classbook-taker-flow");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_group(&mut stdin, &mut reader, &workspace, &["Monday"], 4);

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "taker.open",
        json!({ "groupId": "g1", "date": "2024-09-02" }),
    );
    assert_eq!(opened["phase"], "active");
    assert_eq!(opened["pendingCount"], 4);
    assert_eq!(opened["current"]["id"], "s1");

    // skip s1, mark s2 late; the index stays put and s3 slides under it
    let skipped = request_ok(&mut stdin, &mut reader, "k1", "taker.key", json!({ "key": "s" }));
    assert_eq!(skipped["current"]["id"], "s2");
    assert!(skipped["written"].is_null());

    let marked = request_ok(&mut stdin, &mut reader, "k2", "taker.key", json!({ "key": "r" }));
    assert_eq!(marked["written"]["studentId"], "s2");
    assert_eq!(marked["written"]["status"], "late");
    assert_eq!(marked["currentIndex"], 1);
    assert_eq!(marked["pendingCount"], 3);
    assert_eq!(marked["current"]["id"], "s3");

    // back to the skipped student
    let back = request_ok(&mut stdin, &mut reader, "k3", "taker.key", json!({ "key": "ArrowLeft" }));
    assert_eq!(back["current"]["id"], "s1");

    for (i, expected_next) in [Some("s3"), Some("s4"), None].into_iter().enumerate() {
        let r = request_ok(
            &mut stdin,
            &mut reader,
            &format!("p{}", i),
            "taker.key",
            json!({ "key": "p" }),
        );
        match expected_next {
            Some(id) => assert_eq!(r["current"]["id"], id),
            None => {
                assert_eq!(r["phase"], "completed");
                assert_eq!(r["pendingCount"], 0);
                assert!(r["current"].is_null());
            }
        }
    }

    let done = request_ok(&mut stdin, &mut reader, "esc", "taker.key", json!({ "key": "Escape" }));
    assert_eq!(done["phase"], "closed");
    let code = request_err(&mut stdin, &mut reader, "gone", "taker.state", json!({}));
    assert_eq!(code, "no_session");

    let record = request_ok(
        &mut stdin,
        &mut reader,
        "rec",
        "attendance.record",
        json!({ "groupId": "g1", "studentId": "s2" }),
    );
    assert_eq!(record["entries"]["2024-09-02"], "late");
    for id in ["s1", "s3", "s4"] {
        let r = request_ok(
            &mut stdin,
            &mut reader,
            &format!("get-{}", id),
            "attendance.get",
            json!({ "groupId": "g1", "studentId": id, "date": "2024-09-02" }),
        );
        assert_eq!(r["status"], "present", "{}", id);
    }
}

#[test]
fn skipping_past_the_last_pending_student_closes_the_flow() {
    let workspace = temp_dir("classbook-taker-skip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_group(&mut stdin, &mut reader, &workspace, &["Monday"], 2);

    request_ok(
        &mut stdin,
        &mut reader,
        "preset",
        "attendance.set",
        json!({ "groupId": "g1", "studentId": "s1", "date": "2024-09-02", "status": "absent" }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "taker.open",
        json!({ "groupId": "g1", "date": "2024-09-02" }),
    );
    // already-marked students are not queued
    assert_eq!(opened["pendingCount"], 1);
    assert_eq!(opened["current"]["id"], "s2");

    let closed = request_ok(&mut stdin, &mut reader, "skip", "taker.key", json!({ "key": "ArrowRight" }));
    assert_eq!(closed["phase"], "closed");
    let status = request_ok(
        &mut stdin,
        &mut reader,
        "get",
        "attendance.get",
        json!({ "groupId": "g1", "studentId": "s2", "date": "2024-09-02" }),
    );
    assert_eq!(status["status"], "pending");
}

#[test]
fn opening_on_a_fully_marked_date_starts_completed() {
    let workspace = temp_dir("classbook-taker-empty");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_group(&mut stdin, &mut reader, &workspace, &["Monday"], 1);

    request_ok(
        &mut stdin,
        &mut reader,
        "preset",
        "attendance.set",
        json!({ "groupId": "g1", "studentId": "s1", "date": "2024-09-09", "status": "present" }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "taker.open",
        json!({ "groupId": "g1", "date": "2024-09-09" }),
    );
    assert_eq!(opened["phase"], "completed");
    assert!(opened["current"].is_null());

    // delete/backspace is not a taker key
    let unchanged = request_ok(&mut stdin, &mut reader, "del", "taker.key", json!({ "key": "Delete" }));
    assert_eq!(unchanged["phase"], "completed");
}
