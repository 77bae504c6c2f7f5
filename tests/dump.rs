use std::process::Command;

#[test]
fn dump_tool_output_goes_to_stdout() {
    let out = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_db_backup"))
        .args(["--dry-run", "dump", "-t", "mongodb", "-u", "root", "--mongo-all", "--out"])
        .arg(out.path())
        .env_remove("DB_PASSWORD")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.starts_with("dry-run: "), "stdout: {stdout}");
    assert!(stdout.contains("mongodump"));
    assert!(stdout.contains("--authenticationDatabase=admin"));
    assert!(!stderr.contains("dry-run: "));
}
