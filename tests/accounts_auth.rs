use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
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
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn expect_ok(value: &serde_json::Value) -> &serde_json::Value {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "expected ok response, got {}",
        value
    );
    value.get("result").expect("result")
}

fn expect_err_code(value: &serde_json::Value, code: &str) {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "expected error response, got {}",
        value
    );
    assert_eq!(
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some(code),
        "unexpected error code in {}",
        value
    );
}

fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &std::path::Path,
) {
    let resp = request(
        stdin,
        reader,
        "setup-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    expect_ok(&resp);
}

fn register(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    username: &str,
    password: &str,
) -> String {
    let resp = request(
        stdin,
        reader,
        id,
        "account.register",
        json!({ "username": username, "password": password, "confirmPassword": password }),
    );
    expect_ok(&resp)["userId"]
        .as_str()
        .expect("userId")
        .to_string()
}

#[test]
fn register_then_login_round_trip() {
    let workspace = temp_dir("gradebook-auth-roundtrip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let user_id = register(&mut stdin, &mut reader, "1", "ms-turing", "enigma-1912");

    let logged_in = request(
        &mut stdin,
        &mut reader,
        "2",
        "account.login",
        json!({ "username": "ms-turing", "password": "enigma-1912" }),
    );
    assert_eq!(expect_ok(&logged_in)["userId"], json!(user_id));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn register_rejects_blank_and_mismatched_fields() {
    let workspace = temp_dir("gradebook-auth-register-validation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let blank = request(
        &mut stdin,
        &mut reader,
        "1",
        "account.register",
        json!({ "username": "  ", "password": "pw", "confirmPassword": "pw" }),
    );
    expect_err_code(&blank, "bad_params");

    let mismatch = request(
        &mut stdin,
        &mut reader,
        "2",
        "account.register",
        json!({ "username": "someone", "password": "pw-a", "confirmPassword": "pw-b" }),
    );
    expect_err_code(&mismatch, "bad_params");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn duplicate_username_is_rejected() {
    let workspace = temp_dir("gradebook-auth-duplicate");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let _ = register(&mut stdin, &mut reader, "1", "taken", "pw-one");
    let again = request(
        &mut stdin,
        &mut reader,
        "2",
        "account.register",
        json!({ "username": "taken", "password": "pw-two", "confirmPassword": "pw-two" }),
    );
    expect_err_code(&again, "username_taken");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn login_failure_is_one_indistinguishable_error() {
    let workspace = temp_dir("gradebook-auth-failure");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let _ = register(&mut stdin, &mut reader, "1", "real-user", "right-pw");

    let wrong_pw = request(
        &mut stdin,
        &mut reader,
        "2",
        "account.login",
        json!({ "username": "real-user", "password": "wrong-pw" }),
    );
    expect_err_code(&wrong_pw, "invalid_credentials");

    let no_user = request(
        &mut stdin,
        &mut reader,
        "3",
        "account.login",
        json!({ "username": "ghost", "password": "right-pw" }),
    );
    expect_err_code(&no_user, "invalid_credentials");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_user_id_is_unauthorized() {
    let workspace = temp_dir("gradebook-auth-unknown");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "classes.list",
        json!({ "userId": "no-such-user" }),
    );
    expect_err_code(&resp, "unauthorized");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn tenants_cannot_see_each_others_classes() {
    let workspace = temp_dir("gradebook-auth-isolation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let alice = register(&mut stdin, &mut reader, "1", "alice", "pw-alice");
    let bob = register(&mut stdin, &mut reader, "2", "bob", "pw-bob");

    let created = request(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "userId": alice, "yearGroup": 13, "subject": "Maths AA HL" }),
    );
    let class_id = expect_ok(&created)["classId"]
        .as_str()
        .expect("classId")
        .to_string();

    // Bob's listing is empty and Alice's class is invisible to him.
    let bob_list = request(
        &mut stdin,
        &mut reader,
        "4",
        "classes.list",
        json!({ "userId": bob }),
    );
    assert_eq!(
        expect_ok(&bob_list)["classes"].as_array().map(|c| c.len()),
        Some(0)
    );

    let bob_view = request(
        &mut stdin,
        &mut reader,
        "5",
        "classes.overview",
        json!({ "userId": bob, "classId": class_id }),
    );
    expect_err_code(&bob_view, "not_found");

    let bob_upload = request(
        &mut stdin,
        &mut reader,
        "6",
        "boundaries.upload",
        json!({ "userId": bob, "classId": class_id, "content": "Maths AA HL\n7,90,100\n" }),
    );
    expect_err_code(&bob_upload, "not_found");

    drop(stdin);
    let _ = child.wait();
}
