use std::io::Write;
use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result, ensure};
use serde_json::Value;

fn rexi(args: &[&str], stdin: Option<&str>) -> Result<Output> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_rexi"))
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Spawning rexi")?;
    if let Some(input) = stdin {
        child
            .stdin
            .take()
            .context("Opening stdin")?
            .write_all(input.as_bytes())
            .context("Writing stdin")?;
    } else {
        drop(child.stdin.take());
    }
    child.wait_with_output().context("Waiting for rexi")
}

fn stdout_json(output: &Output) -> Result<Value> {
    serde_json::from_slice(&output.stdout).context("Parsing rexi JSON output")
}

#[test]
fn runs_a_file_with_the_default_backend() -> Result<()> {
    let output = rexi(&["tests/programs/sum/program.rexi"], None)?;
    ensure!(output.status.success(), "rexi failed: {output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "15\n");
    Ok(())
}

#[test]
fn reads_stdin_when_no_file_is_given() -> Result<()> {
    let output = rexi(&["--backend", "ir-vm"], Some("IN a = 2; output a * 21;"))?;
    ensure!(output.status.success(), "rexi failed: {output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "42\n");
    Ok(())
}

#[test]
fn json_report_carries_output_and_variables() -> Result<()> {
    let output = rexi(
        &["--format", "json", "tests/programs/sum/program.rexi"],
        None,
    )?;
    ensure!(output.status.success(), "rexi failed: {output:?}");
    let report = stdout_json(&output)?;
    assert_eq!(report["output"], serde_json::json!(["15"]));
    assert_eq!(report["variables"]["sum"], serde_json::json!(15));
    Ok(())
}

#[test]
fn json_errors_exit_with_failure() -> Result<()> {
    let output = rexi(&["--format", "json"], Some("IN x = \"hello\";"))?;
    ensure!(!output.status.success(), "expected failure: {output:?}");
    let report = stdout_json(&output)?;
    let message = report["error"].as_str().context("error field")?;
    assert_eq!(message, "Variable x must be of type IN");
    Ok(())
}

#[test]
fn json_ir_is_a_list_of_quadruples() -> Result<()> {
    let output = rexi(&["--backend", "ir", "--format", "json"], Some("IN x = 1;"))?;
    ensure!(output.status.success(), "rexi failed: {output:?}");
    assert_eq!(
        stdout_json(&output)?,
        serde_json::json!([["LOAD_CONST", "1", null, "t1"], ["ASSIGN", "t1", null, "x"]])
    );
    Ok(())
}

#[test]
fn check_reports_every_illegal_character() -> Result<()> {
    let output = rexi(&["--check"], Some("IN a = 1 # 2;\nIN b = a @ 3;"))?;
    ensure!(!output.status.success(), "expected failure: {output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Illegal character '#'"), "{stderr}");
    assert!(stderr.contains("Illegal character '@'"), "{stderr}");
    Ok(())
}

#[test]
fn syntax_errors_fail_in_text_mode() -> Result<()> {
    let output = rexi(&["tests/programs/syntax_error/program.rexi"], None)?;
    ensure!(!output.status.success(), "expected failure: {output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Syntax error"), "{stderr}");
    Ok(())
}

#[test]
fn ir_listing_errors_carry_the_compilation_prefix() -> Result<()> {
    let output = rexi(
        &["--backend", "ir", "tests/programs/syntax_error/program.rexi"],
        None,
    )?;
    ensure!(!output.status.success(), "expected failure: {output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Compilation error: Syntax error"), "{stderr}");
    Ok(())
}
