use std::path::Path;
use std::process::{Command, Output};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

fn taskbell(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taskbell"))
        .args(args)
        .env("TASKBELL_DB_PATH", dir.join("tasks.db"))
        .env("TASKBELL_CONFIG_PATH", dir.join("missing-config.json"))
        .env("TASKBELL_DISABLE_NOTIFICATIONS", "1")
        .env("TASKBELL_LOG", "off")
        .output()
        .expect("failed to run taskbell")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn notify_without_due_reminders() {
    let dir = tempfile::tempdir().unwrap();
    let due = (OffsetDateTime::now_utc() + Duration::days(1))
        .format(&Rfc3339)
        .unwrap();
    taskbell(dir.path(), &["add", "Later", "--due", &due]);

    let output = taskbell(dir.path(), &["notify"]);

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "No reminders due.");
    let alarms = stdout_json(&taskbell(dir.path(), &["reminders", "--json"]));
    assert_eq!(alarms.as_array().unwrap().len(), 1);
}

#[test]
fn notify_delivers_due_reminder_once() {
    let dir = tempfile::tempdir().unwrap();
    let now = OffsetDateTime::now_utc();
    let due = (now + Duration::hours(1)).format(&Rfc3339).unwrap();
    let later = (now + Duration::hours(2)).format(&Rfc3339).unwrap();
    let task = stdout_json(&taskbell(
        dir.path(),
        &["add", "Stretch", "--due", &due, "--remind", "15", "--json"],
    ));
    assert!(task["reminder"].is_string());

    let early = stdout_json(&taskbell(dir.path(), &["notify", "--json"]));
    assert!(early["delivered"].as_array().unwrap().is_empty());

    let first = stdout_json(&taskbell(dir.path(), &["notify", "--at", &later, "--json"]));
    let delivered = first["delivered"].as_array().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0]["task_id"], task["id"]);
    assert!(
        delivered[0]["body"]
            .as_str()
            .unwrap()
            .starts_with("Your task is due in 15 minutes")
    );

    let second = stdout_json(&taskbell(dir.path(), &["notify", "--at", &later, "--json"]));
    assert!(second["delivered"].as_array().unwrap().is_empty());

    // The fired alert is gone, so the next start drops the stale handle.
    let shown = stdout_json(&taskbell(
        dir.path(),
        &["show", task["id"].as_str().unwrap(), "--json"],
    ));
    assert!(shown["reminder"].is_null());
}

#[test]
fn notify_rejects_unreadable_dispatch_time() {
    let dir = tempfile::tempdir().unwrap();

    let output = taskbell(dir.path(), &["notify", "--at", "soonish"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("ERROR: validation_error"));
}

#[test]
fn show_describes_pending_reminder() {
    let dir = tempfile::tempdir().unwrap();
    let due = (OffsetDateTime::now_utc() + Duration::days(3))
        .format(&Rfc3339)
        .unwrap();
    let task = stdout_json(&taskbell(
        dir.path(),
        &["add", "Renew passport", "--due", &due, "--remind", "1440", "--json"],
    ));

    let output = taskbell(dir.path(), &["show", task["id"].as_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Description: Renew passport"));
    assert!(stdout.contains("Reminder: Your task \"Renew passport\" is due in 1 day"));
}
