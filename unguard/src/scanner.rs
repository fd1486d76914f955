//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Locating conditional blocks by their opening directive.

use regex::Regex;

use crate::directive::Directive;

/// Selects the opening lines of the blocks a pass is interested in.
#[derive(Debug, Clone)]
pub enum Opener {
    /// Exact keyword, and exact operand once whitespace is removed.
    Directive { keyword: String, condition: String },
    /// Any opening directive whose normalized text matches the expression.
    /// Comments never take part in the match.
    Pattern(Regex),
}

impl Opener {
    pub fn directive(keyword: &str, condition: &str) -> Self {
        Opener::Directive {
            keyword: keyword.to_string(),
            condition: condition.chars().filter(|c| !c.is_whitespace()).collect(),
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        let Some(d) = Directive::parse(line) else {
            return false;
        };
        match self {
            Opener::Directive { keyword, condition } => {
                d.keyword == keyword && d.condition_key() == *condition
            }
            Opener::Pattern(re) => {
                d.opens() && re.is_match(&d.normalized())
            }
        }
    }
}

/// How `#if`/`#else`/`#endif` lines inside a candidate block are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Track nesting depth; foreign conditionals inside the block are body text
    /// in their entirety.
    #[default]
    Nested,
    /// No nesting: every `#else` switches branch and the first `#endif`
    /// closes the block. A nested conditional inside a guard block loses its
    /// `#endif` to the outer block.
    Flat,
}

/// A `[open, close]` span of lines. `else_lines` holds the branch
/// separators; the first one splits the if-branch from the else-branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalBlock {
    pub open: usize,
    pub else_lines: Vec<usize>,
    /// The separator is an `#elif`, so the else side is itself a conditional.
    pub chained: bool,
    pub close: usize,
}

impl ConditionalBlock {
    pub fn else_at(&self) -> Option<usize> {
        self.else_lines.first().copied()
    }
}

/// Find every block opened by `opener`. Blocks never overlap: scanning
/// resumes after the close of each block found. An opener without a close
/// is skipped and left alone.
pub fn extract<S: AsRef<str>>(lines: &[S], opener: &Opener, mode: ScanMode) -> Vec<ConditionalBlock> {
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !opener.matches(lines[i].as_ref()) {
            i += 1;
            continue;
        }
        match scan_block(lines, i, mode) {
            Some(block) => {
                i = block.close + 1;
                blocks.push(block);
            }
            None => {
                log::debug!("unterminated conditional at line {}", i + 1);
                i += 1;
            }
        }
    }

    blocks
}

fn scan_block<S: AsRef<str>>(lines: &[S], open: usize, mode: ScanMode) -> Option<ConditionalBlock> {
    let mut else_lines = Vec::new();
    let mut chained = false;
    let mut depth = 0usize;

    for (idx, line) in lines.iter().enumerate().skip(open + 1) {
        let Some(d) = Directive::parse(line.as_ref()) else {
            continue;
        };
        match mode {
            ScanMode::Flat => {
                if d.is_endif() {
                    return Some(ConditionalBlock {
                        open,
                        else_lines,
                        chained: false,
                        close: idx,
                    });
                }
                if d.is_else() {
                    else_lines.push(idx);
                }
            }
            ScanMode::Nested => {
                if d.opens() {
                    depth += 1;
                } else if d.is_endif() {
                    if depth == 0 {
                        return Some(ConditionalBlock {
                            open,
                            else_lines,
                            chained,
                            close: idx,
                        });
                    }
                    depth -= 1;
                } else if depth == 0 && else_lines.is_empty() && (d.is_else() || d.is_elif()) {
                    else_lines.push(idx);
                    chained = d.is_elif();
                }
            }
        }
    }

    None
}
