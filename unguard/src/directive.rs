//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Preprocessor directive lines.

/// A parsed `# keyword operand` line. Comments are not part of the
/// operand, and backslash-newline continuations are spliced into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive<'a> {
    pub keyword: &'a str,
    pub operand: String,
}

impl<'a> Directive<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let rest = line.trim_start().strip_prefix('#')?.trim_start();
        let end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        let (keyword, tail) = rest.split_at(end);
        Some(Directive {
            keyword,
            operand: clean_operand(tail),
        })
    }

    /// `#keyword operand` on one line, without comments.
    pub fn normalized(&self) -> String {
        if self.operand.is_empty() {
            format!("#{}", self.keyword)
        } else {
            format!("#{} {}", self.keyword, self.operand)
        }
    }

    pub fn opens(&self) -> bool {
        matches!(self.keyword, "if" | "ifdef" | "ifndef")
    }

    pub fn is_else(&self) -> bool {
        self.keyword == "else"
    }

    pub fn is_elif(&self) -> bool {
        matches!(self.keyword, "elif" | "elifdef" | "elifndef")
    }

    pub fn is_endif(&self) -> bool {
        self.keyword == "endif"
    }

    /// The operand with all whitespace removed, for literal comparisons.
    pub fn condition_key(&self) -> String {
        self.operand.chars().filter(|c| !c.is_whitespace()).collect()
    }
}

/// Splice continuations and replace each comment with a space. Text after
/// a `/* */` comment is kept; a `//` comment or an unterminated `/*` ends
/// the operand.
fn clean_operand(tail: &str) -> String {
    let spliced = tail.replace("\\\r\n", " ").replace("\\\n", " ");
    let mut out = String::with_capacity(spliced.len());
    let mut chars = spliced.chars().peekable();
    let mut quote = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        let next = chars.peek().copied();
        match (c, next) {
            ('/', Some('/')) => break,
            ('/', Some('*')) => {
                chars.next();
                let mut prev = ' ';
                let mut closed = false;
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    prev = c;
                }
                if !closed {
                    break;
                }
                out.push(' ');
            }
            ('"' | '\'', _) => {
                quote = Some(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out.trim().to_string()
}
