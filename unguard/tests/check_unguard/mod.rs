//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use plib::testing::{run_test, FixtureTree, TestPlan};

fn check_test(args: &[String], expected_out: &str, expected_err: &str, expected_exit_code: i32) {
    run_test(TestPlan {
        cmd: String::from("check-unguard"),
        args: args.to_vec(),
        stdin_data: String::new(),
        expected_out: String::from(expected_out),
        expected_err: String::from(expected_err),
        expected_exit_code,
    });
}

fn dir_arg(fixture: &FixtureTree) -> String {
    fixture.path().to_string_lossy().into_owned()
}

#[test]
fn test_clean_tree() {
    let fixture = FixtureTree::new();
    fixture
        .file("src/main.c", "int main(void) { return 0; }\n")
        .file("notes.txt", "SPEC is not scanned here\n");
    check_test(
        &[dir_arg(&fixture)],
        "No leftover SPEC tokens found. All files are clean.\n",
        "",
        0,
    );
}

#[test]
fn test_dirty_tree() {
    let fixture = FixtureTree::new();
    fixture
        .file("src/a.c", "int a;\n#ifdef SPEC\nint b;\n#endif\n")
        .file("src/b.h", "int SPECIAL;\n");
    let expected = format!(
        "Leftover SPEC tokens found in the following files:\n\nIn file: {}\n  Line 2: #ifdef SPEC\n",
        fixture.join("src/a.c").display()
    );
    check_test(&[dir_arg(&fixture)], &expected, "", 1);
}

#[test]
fn test_quiet() {
    let fixture = FixtureTree::new();
    fixture.file("a.cpp", "#if SPEC_CPU_LINUX\n#endif\n");
    check_test(&[String::from("-q"), dir_arg(&fixture)], "", "", 1);
}

#[test]
fn test_other_guard() {
    let fixture = FixtureTree::new();
    fixture.file("a.c", "#ifdef SPEC\n#endif\n");
    check_test(
        &[String::from("-g"), String::from("VENDOR"), dir_arg(&fixture)],
        "No leftover VENDOR tokens found. All files are clean.\n",
        "",
        0,
    );
}

#[test]
fn test_invalid_directory() {
    let fixture = FixtureTree::new();
    let missing = fixture.join("missing");
    check_test(
        &[missing.to_string_lossy().into_owned()],
        "",
        &format!("Invalid directory: {}\n", missing.display()),
        1,
    );
}
