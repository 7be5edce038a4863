use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_marksheetd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env_remove("MARKSHEETD_CONFIG")
        .spawn()
        .expect("spawn marksheetd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "expected error: {}", value);
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
}

fn setup_sheet(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> String {
    let created = request_ok(stdin, reader, "c1", "sheet.create", json!({}));
    let sheet_id = created["sheetId"].as_str().expect("sheetId").to_string();
    request_ok(
        stdin,
        reader,
        "c2",
        "roster.generate",
        json!({ "sheetId": sheet_id, "from": 1, "to": 3 }),
    );
    request_ok(
        stdin,
        reader,
        "c3",
        "questions.addMain",
        json!({ "sheetId": sheet_id, "label": "Q1", "subCount": 2, "maxMarks": 5 }),
    );
    sheet_id
}

fn set_mark(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    sheet_id: &str,
    roll_no: i64,
    raw: serde_json::Value,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        id,
        "marks.set",
        json!({ "sheetId": sheet_id, "rollNo": roll_no, "mainLabel": "Q1", "subLabel": "a", "raw": raw }),
    )
}

#[test]
fn entry_clamps_rounds_clears_and_ignores_garbage() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let sheet_id = setup_sheet(&mut stdin, &mut reader);

    let over = set_mark(&mut stdin, &mut reader, "1", &sheet_id, 1, json!("15"));
    assert_eq!(over["outcome"], "stored");
    assert_eq!(over["value"].as_f64(), Some(5.0));

    let under = set_mark(&mut stdin, &mut reader, "2", &sheet_id, 1, json!("-5"));
    assert_eq!(under["value"].as_f64(), Some(0.0));

    let rounded = set_mark(&mut stdin, &mut reader, "3", &sheet_id, 1, json!("2.4567"));
    assert_eq!(rounded["value"].as_f64(), Some(2.46));

    let numeric = set_mark(&mut stdin, &mut reader, "4", &sheet_id, 1, json!(3.5));
    assert_eq!(numeric["value"].as_f64(), Some(3.5));

    let garbage = set_mark(&mut stdin, &mut reader, "5", &sheet_id, 1, json!("abc"));
    assert_eq!(garbage["outcome"], "ignored");
    assert_eq!(garbage["reason"], "not_numeric");
    for (i, raw) in ["inf", "-infinity", "NaN"].iter().enumerate() {
        let id = format!("5.{}", i);
        let spelled = set_mark(&mut stdin, &mut reader, &id, &sheet_id, 1, json!(raw));
        assert_eq!(spelled["outcome"], "ignored", "{}", raw);
        assert_eq!(spelled["reason"], "not_numeric", "{}", raw);
    }
    let totals = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "sheet.totals",
        json!({ "sheetId": sheet_id, "rollNo": 1 }),
    );
    assert_eq!(totals["totals"]["grandTotal"].as_f64(), Some(3.5));

    let cleared = set_mark(&mut stdin, &mut reader, "7", &sheet_id, 1, json!(""));
    assert_eq!(cleared["outcome"], "cleared");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "sheet.export",
        json!({ "sheetId": sheet_id }),
    );
    assert!(exported["students"][0]["marks"]["Q1.A"].is_null());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn absent_and_finalized_edits_are_silently_ignored() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let sheet_id = setup_sheet(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "roster.setAbsent",
        json!({ "sheetId": sheet_id, "rollNo": 2, "absent": true }),
    );
    let absent = set_mark(&mut stdin, &mut reader, "2", &sheet_id, 2, json!("4"));
    assert_eq!(absent["outcome"], "ignored");
    assert_eq!(absent["reason"], "absent");

    request_ok(&mut stdin, &mut reader, "3", "sheet.finalize", json!({ "sheetId": sheet_id }));
    let locked = set_mark(&mut stdin, &mut reader, "4", &sheet_id, 1, json!("4"));
    assert_eq!(locked["reason"], "locked");

    let again = request(&mut stdin, &mut reader, "5", "sheet.finalize", json!({ "sheetId": sheet_id }));
    assert_eq!(error_code(&again), "sheet_locked");
    let rule = request(
        &mut stdin,
        &mut reader,
        "6",
        "rules.apply",
        json!({ "sheetId": sheet_id, "mainLabel": "Q1", "minToCount": 1, "outOf": 2 }),
    );
    assert_eq!(error_code(&rule), "sheet_locked");

    let unlocked = request_ok(&mut stdin, &mut reader, "7", "sheet.unfinalize", json!({ "sheetId": sheet_id }));
    assert_eq!(unlocked["wasLocked"], true);
    let stored = set_mark(&mut stdin, &mut reader, "8", &sheet_id, 1, json!("4"));
    assert_eq!(stored["outcome"], "stored");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_references_are_errors() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let sheet_id = setup_sheet(&mut stdin, &mut reader);

    let student = request(
        &mut stdin,
        &mut reader,
        "1",
        "marks.set",
        json!({ "sheetId": sheet_id, "rollNo": 99, "mainLabel": "Q1", "subLabel": "A", "raw": "1" }),
    );
    assert_eq!(error_code(&student), "not_found");

    let question = request(
        &mut stdin,
        &mut reader,
        "2",
        "marks.set",
        json!({ "sheetId": sheet_id, "rollNo": 1, "mainLabel": "Q9", "subLabel": "A", "raw": "1" }),
    );
    assert_eq!(error_code(&question), "not_found");

    let label = request(
        &mut stdin,
        &mut reader,
        "3",
        "marks.set",
        json!({ "sheetId": sheet_id, "rollNo": 1, "mainLabel": "Q1", "subLabel": "AB", "raw": "1" }),
    );
    assert_eq!(error_code(&label), "bad_params");

    let sheet = request(
        &mut stdin,
        &mut reader,
        "4",
        "marks.set",
        json!({ "sheetId": "nope", "rollNo": 1, "mainLabel": "Q1", "subLabel": "A", "raw": "1" }),
    );
    assert_eq!(error_code(&sheet), "not_found");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn bulk_set_reports_per_edit_outcomes_and_limit() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let sheet_id = setup_sheet(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "roster.setAbsent",
        json!({ "sheetId": sheet_id, "rollNo": 3, "absent": true }),
    );
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "marks.bulkSet",
        json!({
            "sheetId": sheet_id,
            "edits": [
                { "rollNo": 1, "mainLabel": "Q1", "subLabel": "A", "raw": "4" },
                { "rollNo": 1, "mainLabel": "Q1", "subLabel": "B", "raw": "9" },
                { "rollNo": 2, "mainLabel": "Q1", "subLabel": "A", "raw": "x" },
                { "rollNo": 3, "mainLabel": "Q1", "subLabel": "A", "raw": "1" },
                { "rollNo": 1, "mainLabel": "Q1", "subLabel": "C", "raw": "1" },
                { "rollNo": 1, "mainLabel": "Q1" }
            ]
        }),
    );
    assert_eq!(res["updated"], 2);
    assert_eq!(res["ignored"], 2);
    assert_eq!(res["rejected"], 2);
    assert_eq!(res["errors"][0]["index"], 4);
    assert_eq!(res["errors"][0]["code"], "not_found");

    let totals = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "sheet.totals",
        json!({ "sheetId": sheet_id, "rollNo": 1 }),
    );
    assert_eq!(totals["totals"]["grandTotal"].as_f64(), Some(9.0));

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "entry", "patch": { "bulkEditLimit": 1 } }),
    );
    let limited = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "marks.bulkSet",
        json!({
            "sheetId": sheet_id,
            "edits": [
                { "rollNo": 1, "mainLabel": "Q1", "subLabel": "A", "raw": "1" },
                { "rollNo": 1, "mainLabel": "Q1", "subLabel": "B", "raw": "1" }
            ]
        }),
    );
    assert_eq!(limited["limitExceeded"], true);
    assert_eq!(limited["updated"], 0);
    assert_eq!(limited["errors"][0]["code"], "too_many_edits");

    drop(stdin);
    let _ = child.wait();
}
