//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Running the external build tool on a target directory.

use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::error::{Error, Result};
use crate::tree::{SourceFilter, SourceTree};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    /// Nonzero exit, or killed by a signal (`status` is `None`).
    Failed { status: Option<i32>, output: String },
    TimedOut { output: String },
}

/// Whether any eligible source under `dir` defines `int main(`.
pub fn has_entry_point(tree: &SourceTree, dir: &Path, filter: &SourceFilter) -> Result<bool> {
    let main = Regex::new(r"\bint\s+main\s*\(")?;
    Ok(tree
        .sources_under(dir, filter)
        .filter_map(|path| tree.contents(path))
        .any(|bytes| main.is_match(&String::from_utf8_lossy(bytes))))
}

/// Sends SIGKILL to the whole process group led by `pid`.
///
/// # Arguments
///
/// * `pid` - [u32] process id of the group leader.
fn kill_group(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Runs the build tool in `dir` and waits for it, at most `config.timeout`.
///
/// The tool runs in its own process group so that a timeout also kills
/// anything it started. Standard output and standard error are captured
/// and returned together.
///
/// # Errors
///
/// Returns [Error::Build] if the tool cannot be started.
pub fn run_build(config: &BuildConfig, dir: &Path) -> Result<BuildOutcome> {
    log::debug!("running {} in {}", config.program, dir.display());

    let mut child = Command::new(&config.program)
        .args(&config.args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|e| Error::Build(format!("{}: {}", config.program, e)))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + config.timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if Instant::now() >= deadline {
            log::debug!("{} timed out after {:?}", config.program, config.timeout);
            kill_group(child.id());
            child.wait()?;
            break None;
        }
        thread::sleep(POLL_INTERVAL);
    };

    let mut output = stdout.join().unwrap_or_default();
    output.extend(stderr.join().unwrap_or_default());
    let output = String::from_utf8_lossy(&output).into_owned();

    Ok(match status {
        Some(status) if status.success() => BuildOutcome::Succeeded,
        Some(status) => BuildOutcome::Failed {
            status: status.code(),
            output,
        },
        None => BuildOutcome::TimedOut { output },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(program: &str, args: &[&str], timeout: Duration) -> BuildConfig {
        BuildConfig {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout,
        }
    }

    #[test]
    fn entry_point_detection() {
        let filter = SourceFilter::new(["c"]);
        let mut tree = SourceTree::new();
        tree.insert("src/util.c", b"int helper(void);\n".to_vec());
        assert!(!has_entry_point(&tree, Path::new("src"), &filter).unwrap());
        tree.insert("src/main.c", b"int\nmain (int argc, char **argv)\n{}\n".to_vec());
        assert!(has_entry_point(&tree, Path::new("src"), &filter).unwrap());
        assert!(!has_entry_point(&tree, Path::new("lib"), &filter).unwrap());
    }

    #[test]
    fn exit_status() {
        let dir = std::env::temp_dir();
        let timeout = Duration::from_secs(30);
        assert_eq!(
            run_build(&config("true", &[], timeout), &dir).unwrap(),
            BuildOutcome::Succeeded
        );
        match run_build(&config("sh", &["-c", "echo broken >&2; exit 3"], timeout), &dir).unwrap() {
            BuildOutcome::Failed { status, output } => {
                assert_eq!(status, Some(3));
                assert_eq!(output, "broken\n");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn timeout_kills_the_group() {
        let dir = std::env::temp_dir();
        let start = Instant::now();
        let outcome = run_build(
            &config("sh", &["-c", "sleep 30 & sleep 30"], Duration::from_millis(200)),
            &dir,
        )
        .unwrap();
        assert!(matches!(outcome, BuildOutcome::TimedOut { .. }));
        assert!(start.elapsed() < Duration::from_secs(20));
    }

    #[test]
    fn missing_tool() {
        let dir = std::env::temp_dir();
        let result = run_build(
            &config("/nonexistent/build-tool", &[], Duration::from_secs(1)),
            &dir,
        );
        assert!(matches!(result, Err(Error::Build(_))));
    }
}
