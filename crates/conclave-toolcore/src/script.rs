//! # Script Tools
//!
//! Registered script-kind tools run as child processes: the interpreter is
//! picked from the file extension, parameters go in as one JSON document on
//! stdin, and stdout must come back as JSON. A non-zero exit is a failure.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

fn interpreter_for(path: &str) -> (&'static str, bool) {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("py") => ("python3", true),
        Some("sh") => ("sh", true),
        Some("js") => ("node", true),
        // No known extension: execute the file directly.
        _ => ("", false),
    }
}

/// Run a script tool and parse its stdout as JSON
pub async fn run_script(
    path: &str,
    parameters: &Value,
    timeout: Duration,
) -> Result<Value, String> {
    let (interpreter, use_interpreter) = interpreter_for(path);
    let mut command = if use_interpreter {
        let mut c = Command::new(interpreter);
        c.arg(path);
        c
    } else {
        Command::new(path)
    };

    debug!(path, "Spawning script tool");
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to spawn script '{path}': {e}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        let payload = serde_json::to_vec(parameters).map_err(|e| e.to_string())?;
        stdin
            .write_all(&payload)
            .await
            .map_err(|e| format!("failed to write parameters: {e}"))?;
        // Close stdin so the script sees EOF.
        drop(stdin);
    }

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| format!("script '{path}' timed out after {}s", timeout.as_secs()))?
        .map_err(|e| format!("script '{path}' failed: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "script '{path}' exited with {}: {}",
            output.status,
            stderr.trim()
        ));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| format!("script '{path}' produced invalid JSON: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_script(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn script_receives_params_and_returns_json() {
        let dir = tempfile::tempdir().unwrap();
        // Reads stdin, echoes it back wrapped in a JSON object.
        let path = write_script(&dir, "echo.sh", "read input\necho \"{\\\"echoed\\\": $input}\"\n");

        let result = run_script(&path, &json!({"n": 7}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result["echoed"]["n"], 7);
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(&dir, "fail.sh", "echo oops >&2\nexit 3\n");

        let err = run_script(&path, &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.contains("oops"));
    }

    #[tokio::test]
    async fn invalid_json_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(&dir, "noise.sh", "echo not-json\n");

        let err = run_script(&path, &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.contains("invalid JSON"));
    }

    #[tokio::test]
    async fn missing_script_is_failure() {
        let err = run_script("/nonexistent/tool.sh", &json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.contains("spawn"));
    }
}
