//! Child-process plumbing shared by the command-line backends.

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::EnrichError;

/// Spawn `cmd`, feed it `stdin` if given, and return stdout of a successful
/// exit. `cmd` must be configured with piped stdio and `kill_on_drop`, so
/// dropping the returned future kills the child.
pub(crate) async fn run(
    mut cmd: Command,
    binary: &str,
    stdin: Option<&str>,
) -> Result<String, EnrichError> {
    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            EnrichError::Unavailable(format!("{} not found on PATH", binary))
        }
        _ => EnrichError::Process(format!("Failed to start {}: {}", binary, e)),
    })?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .map_err(|e| EnrichError::Process(format!("Failed to write prompt: {}", e)))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| EnrichError::Process(e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
        return Err(EnrichError::Process(format!(
            "{} exited {}: {}",
            binary,
            output.status.code().map_or("by signal".to_string(), |c| c.to_string()),
            detail
        )));
    }
    Ok(stdout)
}
