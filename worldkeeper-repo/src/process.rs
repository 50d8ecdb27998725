//! Child-process plumbing shared by the native backend and the compaction
//! step of the library backend (git2 exposes no GC API).

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::RepoError;

/// Run a program, returning trimmed stdout on success and a
/// [`RepoError::Process`] carrying stderr on failure.
pub(crate) fn run(program: &str, work_dir: &Path, args: &[&str]) -> Result<String, RepoError> {
    run_with_stdin(program, work_dir, args, None)
}

/// Like [`run`], optionally feeding bytes to the child's stdin.
pub(crate) fn run_with_stdin(
    program: &str,
    work_dir: &Path,
    args: &[&str],
    stdin: Option<&[u8]>,
) -> Result<String, RepoError> {
    let mut command = Command::new(program);
    command.current_dir(work_dir).args(args);
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    if stdin.is_some() {
        command.stdin(Stdio::piped());
    } else {
        command.stdin(Stdio::null());
    }

    tracing::debug!("running {program} {}", args.join(" "));

    let mut child = command.spawn().map_err(|e| RepoError::Process {
        program: program.to_string(),
        detail: format!("could not spawn: {e}"),
    })?;

    if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
        use std::io::Write;
        pipe.write_all(bytes).map_err(|e| RepoError::Process {
            program: program.to_string(),
            detail: format!("could not write stdin: {e}"),
        })?;
    }

    let output = child.wait_with_output().map_err(|e| RepoError::Process {
        program: program.to_string(),
        detail: format!("could not collect output: {e}"),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RepoError::Process {
            program: format!("{program} {}", args.first().copied().unwrap_or("")),
            detail: stderr.trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run a program only for its exit status (no error on nonzero).
pub(crate) fn succeeds(program: &str, work_dir: &Path, args: &[&str]) -> bool {
    Command::new(program)
        .current_dir(work_dir)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// `git gc` with zero grace period and delta compression disabled.
///
/// Snapshots are independent roots, so cross-snapshot delta search costs more
/// than it saves; `pack.window=0` turns it off, `gc.pruneExpire=now` drops
/// unreferenced objects immediately.
pub(crate) fn compact(work_dir: &Path) -> Result<(), RepoError> {
    run(
        "git",
        work_dir,
        &[
            "-c",
            "gc.pruneExpire=now",
            "-c",
            "pack.window=0",
            "gc",
            "--quiet",
        ],
    )
    .map(|_| ())
}
