//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Leftover-token auditing.
//!
//! The auditor only knows the guard patterns. It does not share anything
//! with the rewrite table, so it catches guard tokens from any source.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;
use crate::guard::Guard;
use crate::tree::{SourceFilter, SourceTree};

/// A line containing a guard token. `line_no` is 1-based; `text` is trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub line_no: usize,
    pub text: String,
}

/// Findings per file, for files with at least one finding.
pub type AuditReport = BTreeMap<PathBuf, Vec<Finding>>;

pub fn audit_text(guard: &Guard, text: &str) -> Vec<Finding> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| guard.mentions(line))
        .map(|(i, line)| Finding {
            line_no: i + 1,
            text: line.trim().to_string(),
        })
        .collect()
}

/// Scan every eligible file under `root`. Report keys are `root` joined
/// with the file's relative path. Undecodable bytes are replaced before
/// scanning.
pub fn audit_tree(guard: &Guard, root: &Path, filter: &SourceFilter) -> Result<AuditReport> {
    let mut report = AuditReport::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() || !filter.is_eligible(entry.path()) {
            continue;
        }
        let bytes = fs::read(entry.path())?;
        let findings = audit_text(guard, &String::from_utf8_lossy(&bytes));
        if !findings.is_empty() {
            report.insert(entry.path().to_path_buf(), findings);
        }
    }

    Ok(report)
}

/// Scan the eligible files of an in-memory tree. Keys are relative paths.
pub fn audit_sources(guard: &Guard, tree: &SourceTree, filter: &SourceFilter) -> AuditReport {
    tree.files()
        .filter(|(path, _)| filter.is_eligible(path))
        .filter_map(|(path, entry)| {
            let findings = audit_text(guard, &String::from_utf8_lossy(&entry.bytes));
            if findings.is_empty() {
                None
            } else {
                Some((path.to_path_buf(), findings))
            }
        })
        .collect()
}

pub fn count_findings(report: &AuditReport) -> usize {
    report.values().map(Vec::len).sum()
}

/// Write a human-readable report. An empty report prints the all-clear line.
pub fn write_report<W: Write>(out: &mut W, guard: &Guard, report: &AuditReport) -> io::Result<()> {
    if report.is_empty() {
        writeln!(
            out,
            "No leftover {} tokens found. All files are clean.",
            guard.token()
        )?;
        return Ok(());
    }

    writeln!(
        out,
        "Leftover {} tokens found in the following files:",
        guard.token()
    )?;
    for (path, findings) in report {
        writeln!(out, "\nIn file: {}", path.display())?;
        for finding in findings {
            writeln!(out, "  Line {}: {}", finding.line_no, finding.text)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::DEFAULT_GUARD;
    use plib::testing::FixtureTree;

    fn guard() -> Guard {
        Guard::new(DEFAULT_GUARD).unwrap()
    }

    #[test]
    fn one_finding_per_line() {
        let findings = audit_text(&guard(), "int a;\n  x = SPEC + SPEC_B;\n#define SPECIAL\n");
        assert_eq!(
            findings,
            vec![Finding {
                line_no: 2,
                text: "x = SPEC + SPEC_B;".to_string()
            }]
        );
    }

    #[test]
    fn tree_audit_filters_files() {
        let fixture = FixtureTree::new();
        fixture
            .file("src/clean.c", "int a;\n")
            .file("src/dirty.h", "#ifdef SPEC\n")
            .file("src/notes.txt", "SPEC\n");
        let filter = SourceFilter::new(["c", "h"]);
        let report = audit_tree(&guard(), fixture.path(), &filter).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[&fixture.join("src/dirty.h")][0].line_no, 1);
    }

    #[test]
    fn in_memory_audit() {
        let mut tree = SourceTree::new();
        tree.insert("a.c", b"SPEC_X;\n".to_vec());
        tree.insert("b.c", b"ok;\n".to_vec());
        let report = audit_sources(&guard(), &tree, &SourceFilter::new(["c"]));
        assert_eq!(report.keys().collect::<Vec<_>>(), vec![Path::new("a.c")]);
        assert_eq!(count_findings(&report), 1);
    }

    #[test]
    fn report_format() {
        let mut report = AuditReport::new();
        report.insert(
            PathBuf::from("out/a.c"),
            vec![Finding {
                line_no: 3,
                text: "SPEC;".to_string(),
            }],
        );
        let mut out = Vec::new();
        write_report(&mut out, &guard(), &report).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Leftover SPEC tokens found in the following files:\n\nIn file: out/a.c\n  Line 3: SPEC;\n"
        );

        let mut out = Vec::new();
        write_report(&mut out, &guard(), &AuditReport::new()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "No leftover SPEC tokens found. All files are clean.\n"
        );
    }
}
