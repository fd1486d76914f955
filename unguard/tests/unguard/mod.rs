//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use plib::testing::{run_test, run_test_with_checker, FixtureTree, TestPlan};

fn unguard_test(args: &[&str], stdin_data: &str, expected_out: &str, expected_err: &str, expected_exit_code: i32) {
    run_test(TestPlan {
        cmd: String::from("unguard"),
        args: args.iter().map(|s| String::from(*s)).collect(),
        stdin_data: String::from(stdin_data),
        expected_out: String::from(expected_out),
        expected_err: String::from(expected_err),
        expected_exit_code,
    });
}

fn unguard_plan(args: &[String]) -> TestPlan {
    TestPlan {
        cmd: String::from("unguard"),
        args: args.to_vec(),
        stdin_data: String::new(),
        expected_out: String::new(),
        expected_err: String::new(),
        expected_exit_code: 0,
    }
}

fn path_arg(fixture: &FixtureTree, relpath: &str) -> String {
    fixture.join(relpath).to_string_lossy().into_owned()
}

#[test]
fn test_filter_keeps_else_branch() {
    unguard_test(
        &["-"],
        "int a;\n#ifdef SPEC\nint b;\n#else\nint c;\n#endif\n",
        "int a;\nint c;\n",
        "",
        0,
    );
}

#[test]
fn test_filter_keeps_ifndef_branch() {
    unguard_test(
        &["-"],
        "#ifndef SPEC_MPI\nstatic int rank = 0;\n#else\nstatic int rank;\n#endif\n",
        "static int rank = 0;\n",
        "",
        0,
    );
}

#[test]
fn test_filter_other_guard() {
    unguard_test(
        &["-g", "VENDOR", "-"],
        "#ifdef VENDOR\nvendor();\n#endif\n#ifdef SPEC\nspec();\n#endif\n",
        "#ifdef SPEC\nspec();\n#endif\n",
        "",
        0,
    );
}

#[test]
fn test_filter_comment_does_not_change_condition() {
    unguard_test(
        &["-"],
        "#if defined(A) /* SPEC */ && defined(B)\nab();\n#endif\n",
        "#if defined(A) /*  */ && defined(B)\nab();\n#endif\n",
        "",
        0,
    );
}

#[test]
fn test_filter_continued_condition() {
    unguard_test(
        &["-"],
        "#if !defined(SPEC) || \\\n    defined(FAST)\nfast();\n#endif\n",
        "fast();\n",
        "",
        0,
    );
}

#[test]
fn test_filter_clean_input_unchanged() {
    let src = "#include <stdio.h>\n#ifdef DEBUG\nint debug;\n#endif\n";
    unguard_test(&["-"], src, src, "", 0);
}

#[test]
fn test_invalid_guard() {
    run_test_with_checker(
        TestPlan {
            cmd: String::from("unguard"),
            args: vec![String::from("-g"), String::from("1BAD"), String::from("-")],
            stdin_data: String::new(),
            expected_out: String::new(),
            expected_err: String::new(),
            expected_exit_code: 1,
        },
        |plan, output| {
            assert_eq!(output.status.code(), Some(plan.expected_exit_code));
            assert!(output.stdout.is_empty());
            let stderr = String::from_utf8_lossy(&output.stderr);
            assert!(stderr.starts_with("unguard: "), "{stderr}");
        },
    );
}

#[test]
fn test_unknown_rule() {
    run_test_with_checker(
        unguard_plan(&[
            String::from("-d"),
            String::from("no-such-rule"),
            String::from("-"),
        ]),
        |_, output| {
            assert_eq!(output.status.code(), Some(1));
            let stderr = String::from_utf8_lossy(&output.stderr);
            assert!(stderr.contains("no-such-rule"), "{stderr}");
        },
    );
}

#[test]
fn test_list_rules() {
    run_test_with_checker(unguard_plan(&[String::from("--list-rules")]), |_, output| {
        assert_eq!(output.status.code(), Some(0));
        let stdout = String::from_utf8_lossy(&output.stdout);
        let names: Vec<&str> = stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        assert!(names.contains(&"family-defines"));
        assert!(names.contains(&"prid64-format"));
        assert!(stdout.contains("disabled"));
    });
}

#[test]
fn test_batch_pass_and_fail() {
    let fixture = FixtureTree::new();
    fixture
        .file(
            "cpu/505.good/src/main.c",
            "#ifdef SPEC\nspec_init();\n#else\ninit();\n#endif\nint main(void) { return 0; }\n",
        )
        .file("cpu/505.good/data/ref.in", "SPEC input\n")
        .file("cpu/510.bare/docs/readme", "no sources\n");

    let args = vec![path_arg(&fixture, "cpu"), path_arg(&fixture, "out")];
    run_test_with_checker(unguard_plan(&args), |_, output| {
        // the bare unit fails on its input, not its build
        assert_eq!(output.status.code(), Some(1));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("505.good: PASS"), "{stdout}");
        assert!(stdout.contains("510.bare: FAIL"), "{stdout}");
        assert!(stdout.ends_with("1 unit(s) passed, 1 failed\n"), "{stdout}");
    });

    assert_eq!(
        fixture.read("out/pass/505.good/src/main.c"),
        "init();\nint main(void) { return 0; }\n"
    );
    assert_eq!(fixture.read("out/pass/505.good/data/ref.in"), "SPEC input\n");
    assert!(fixture.exists("out/fail/510.bare/docs/readme"));
    assert!(!fixture.exists("out/.staging"));
}

#[test]
fn test_batch_reports_leftovers() {
    let fixture = FixtureTree::new();
    fixture
        .file("cpu/u/src/a.c", "int a;\n")
        .file("cpu/u/include/b.h", "#define LIMIT SPEC_LIMIT\n");

    let args = vec![
        String::from("-q"),
        path_arg(&fixture, "cpu"),
        path_arg(&fixture, "out"),
    ];
    run_test_with_checker(unguard_plan(&args), |_, output| {
        assert_eq!(output.status.code(), Some(1));
        assert!(output.stdout.is_empty());
    });
    assert_eq!(fixture.read("out/fail/u/include/b.h"), "#define LIMIT SPEC_LIMIT\n");
}

#[test]
fn test_dry_run_writes_nothing() {
    let fixture = FixtureTree::new();
    fixture.file("cpu/u/src/a.c", "#ifndef SPEC\nkeep();\n#endif\n");

    let args = vec![
        String::from("-n"),
        path_arg(&fixture, "cpu"),
        path_arg(&fixture, "out"),
    ];
    run_test_with_checker(unguard_plan(&args), |_, output| {
        assert_eq!(output.status.code(), Some(0));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("u: PASS"), "{stdout}");
        assert!(stdout.contains("rewrote src/a.c: 1 block(s) resolved"), "{stdout}");
    });
    assert!(!fixture.exists("out"));
    assert_eq!(fixture.read("cpu/u/src/a.c"), "#ifndef SPEC\nkeep();\n#endif\n");
}

#[test]
fn test_missing_output_operand() {
    let fixture = FixtureTree::new();
    fixture.file("cpu/u/src/a.c", "int a;\n");
    unguard_test(
        &[path_arg(&fixture, "cpu").as_str()],
        "",
        "",
        "unguard: missing output directory operand\n",
        1,
    );
}
