//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

pub struct TestPlan {
    pub cmd: String,
    pub args: Vec<String>,
    pub stdin_data: String,
    pub expected_out: String,
    pub expected_err: String,
    pub expected_exit_code: i32,
}

/// Path of a workspace binary, as built by the current cargo profile.
pub fn binary_path(cmd: &str) -> PathBuf {
    let relpath = if cfg!(debug_assertions) {
        format!("target/debug/{}", cmd)
    } else {
        format!("target/release/{}", cmd)
    };
    std::env::current_dir()
        .unwrap()
        .parent()
        .unwrap() // Move up to the workspace root from the current package directory
        .join(relpath)
}

/// Run a workspace binary with `args`, feeding `stdin_data` and collecting its output.
pub fn run_test_base(cmd: &str, args: &[String], stdin_data: &[u8]) -> Output {
    let mut child = Command::new(binary_path(cmd))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|_| panic!("failed to spawn command {cmd}"));

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(stdin_data) {
            eprintln!("Error writing to stdin: {}", e);
        }
        // dropping stdin closes the pipe
    }

    child.wait_with_output().expect("failed to wait for child")
}

pub fn run_test(plan: TestPlan) {
    let output = run_test_base(&plan.cmd, &plan.args, plan.stdin_data.as_bytes());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, plan.expected_out);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr, plan.expected_err);

    assert_eq!(output.status.code(), Some(plan.expected_exit_code));
    if plan.expected_exit_code == 0 {
        assert!(output.status.success());
    }
}

pub fn run_test_with_checker<F: FnMut(&TestPlan, &Output)>(plan: TestPlan, mut checker: F) {
    let output = run_test_base(&plan.cmd, &plan.args, plan.stdin_data.as_bytes());
    checker(&plan, &output);
}

/// A throwaway directory tree populated with fixture files.
///
/// The directory is removed when the value is dropped.
pub struct FixtureTree {
    dir: TempDir,
}

impl FixtureTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create fixture directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join<P: AsRef<Path>>(&self, relpath: P) -> PathBuf {
        self.dir.path().join(relpath)
    }

    /// Write `contents` to `relpath`, creating parent directories as needed.
    pub fn file<P: AsRef<Path>>(&self, relpath: P, contents: &str) -> &Self {
        let path = self.join(relpath);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create fixture directory");
        }
        fs::write(&path, contents).expect("failed to write fixture file");
        self
    }

    pub fn dir<P: AsRef<Path>>(&self, relpath: P) -> &Self {
        fs::create_dir_all(self.join(relpath)).expect("failed to create fixture directory");
        self
    }

    pub fn exists<P: AsRef<Path>>(&self, relpath: P) -> bool {
        self.join(relpath).exists()
    }

    pub fn read<P: AsRef<Path>>(&self, relpath: P) -> String {
        let path = self.join(relpath);
        fs::read_to_string(&path)
            .unwrap_or_else(|_| panic!("failed to read {}", path.display()))
    }
}

impl Default for FixtureTree {
    fn default() -> Self {
        Self::new()
    }
}
