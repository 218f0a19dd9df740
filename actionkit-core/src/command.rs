//! Running external tools as stdin → stdout filters.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

use crate::contract::PipelineError;

/// Feeds `input` to `program args..` and returns its standard output.
///
/// `subject` is the file being processed; it only appears in errors.
pub async fn run_filter(
    program: &str,
    args: &[String],
    input: &[u8],
    cwd: Option<&Path>,
    subject: &Path,
) -> Result<Vec<u8>, PipelineError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    debug!(program, ?args, subject = %subject.display(), "Spawning external tool");
    let mut child = command.spawn().map_err(|e| {
        error!(error = ?e, program, "Failed to launch external tool");
        PipelineError::Tool {
            tool: program.to_string(),
            path: subject.to_path_buf(),
            message: format!("failed to launch: {e}"),
        }
    })?;

    let mut stdin = child.stdin.take();
    let feed = async move {
        if let Some(stdin) = stdin.as_mut() {
            stdin.write_all(input).await?;
            stdin.shutdown().await?;
        }
        drop(stdin);
        Ok::<(), std::io::Error>(())
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output.map_err(|e| PipelineError::io(subject, e))?;

    if !output.status.success() {
        let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!(program, status = ?output.status, subject = %subject.display(), %message, "External tool failed");
        return Err(PipelineError::Tool {
            tool: program.to_string(),
            path: subject.to_path_buf(),
            message: if message.is_empty() {
                format!("exited with {}", output.status)
            } else {
                message
            },
        });
    }
    // a tool that exits cleanly without draining stdin is fine
    if let Err(e) = fed {
        debug!(error = ?e, program, "Tool closed stdin early");
    }

    Ok(output.stdout)
}
