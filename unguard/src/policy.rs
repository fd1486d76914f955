//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Deciding which branch of a guard block survives, and splicing it in.

use regex::Regex;

use crate::directive::Directive;
use crate::error::Result;
use crate::guard::Guard;
use crate::scanner::{extract, ConditionalBlock, Opener, ScanMode};

/// The branch of a block that survives resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    IfBranch,
    ElseBranch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Direction is fixed by the opening form.
    Fixed(Keep),
    /// Fold the condition with every guard-family macro undefined.
    Classify,
}

#[derive(Debug, Clone)]
pub struct BlockPass {
    pub name: &'static str,
    pub opener: Opener,
    pub decision: Decision,
}

/// Block passes in the order they run.
pub fn passes(guard: &Guard) -> Result<Vec<BlockPass>> {
    let tok = guard.token();
    let member = format!(r"{}(?:_[A-Z0-9_]+)?", regex::escape(tok));

    Ok(vec![
        BlockPass {
            name: "ifdef",
            opener: Opener::directive("ifdef", tok),
            decision: Decision::Fixed(Keep::ElseBranch),
        },
        BlockPass {
            name: "if-defined",
            opener: Opener::directive("if", &format!("defined({tok})")),
            decision: Decision::Fixed(Keep::ElseBranch),
        },
        BlockPass {
            name: "ifndef",
            opener: Opener::directive("ifndef", tok),
            decision: Decision::Fixed(Keep::IfBranch),
        },
        BlockPass {
            name: "if-not-defined",
            opener: Opener::directive("if", &format!("!defined({tok})")),
            decision: Decision::Fixed(Keep::IfBranch),
        },
        BlockPass {
            name: "family-ifdef",
            opener: Opener::Pattern(Regex::new(&format!(
                r"^\s*#\s*(?:ifdef\s+{member}|if\s+defined\s*(?:\(\s*{member}\s*\)|\s+{member}))$"
            ))?),
            decision: Decision::Fixed(Keep::ElseBranch),
        },
        BlockPass {
            name: "family-ifndef",
            opener: Opener::Pattern(Regex::new(&format!(
                r"^\s*#\s*(?:ifndef\s+{member}|if\s*!\s*defined\s*(?:\(\s*{member}\s*\)|\s+{member}))$"
            ))?),
            decision: Decision::Fixed(Keep::IfBranch),
        },
        BlockPass {
            name: "compound",
            opener: Opener::Pattern(Regex::new(&format!(r"^#if\b.*\b{member}\b"))?),
            decision: Decision::Classify,
        },
    ])
}

/// The lines that replace `block` when `keep` survives. Directive lines
/// of the block are dropped, except that the `#elif` heading a kept chain
/// becomes the `#if` of a new conditional.
pub fn resolve(lines: &[String], block: &ConditionalBlock, keep: Keep) -> Vec<String> {
    let else_at = block.else_at();
    match (keep, else_at) {
        (Keep::IfBranch, _) => lines[block.open + 1..else_at.unwrap_or(block.close)].to_vec(),
        (Keep::ElseBranch, None) => Vec::new(),
        (Keep::ElseBranch, Some(at)) if block.chained => {
            let mut out = Vec::with_capacity(block.close - at + 1);
            out.push(elif_to_if(&lines[at]));
            out.extend_from_slice(&lines[at + 1..=block.close]);
            out
        }
        (Keep::ElseBranch, Some(at)) => (at + 1..block.close)
            .filter(|i| !block.else_lines.contains(i))
            .map(|i| lines[i].clone())
            .collect(),
    }
}

fn elif_to_if(line: &str) -> String {
    match line.find("elif") {
        Some(pos) => format!("{}{}", &line[..pos], &line[pos + 2..]),
        None => line.to_string(),
    }
}

/// Outcome of folding a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cond {
    True,
    False,
    /// Depends only on foreign macros.
    Expr(String),
    /// Uses a guard macro in a way that cannot be folded.
    Unknown,
}

/// Split on `op` outside parentheses.
fn split_top<'a>(s: &'a str, op: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ if depth == 0 && s[i..].starts_with(op) => {
                parts.push(&s[start..i]);
                i += op.len();
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&s[start..]);
    parts
}

/// `(...)` where the opening paren matches the final one.
fn strip_parens(s: &str) -> Option<&str> {
    let inner = s.strip_prefix('(')?.strip_suffix(')')?;
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(inner)
}

/// Parenthesize a residual so it can be negated or nested.
fn wrap(e: String) -> String {
    if (e.contains("||") || e.contains("&&")) && strip_parens(&e).is_none() {
        format!("({e})")
    } else {
        e
    }
}

struct Folder {
    defined: Regex,
    ident: Regex,
}

impl Folder {
    fn new() -> Result<Self> {
        Ok(Folder {
            defined: Regex::new(r"^defined\s*(?:\(\s*(\w+)\s*\)|\s+(\w+))$")?,
            ident: Regex::new(r"^[A-Za-z_]\w*$")?,
        })
    }

    fn fold(&self, guard: &Guard, expr: &str) -> Cond {
        let expr = expr.trim();

        let alternatives = split_top(expr, "||");
        if alternatives.len() > 1 {
            return self.combine(guard, &alternatives, " || ", Cond::True, Cond::False);
        }
        let conjuncts = split_top(expr, "&&");
        if conjuncts.len() > 1 {
            return self.combine(guard, &conjuncts, " && ", Cond::False, Cond::True);
        }

        if let Some(rest) = expr.strip_prefix('!') {
            return match self.fold(guard, rest) {
                Cond::True => Cond::False,
                Cond::False => Cond::True,
                Cond::Expr(e) => Cond::Expr(format!("!{}", wrap(e))),
                Cond::Unknown => Cond::Unknown,
            };
        }
        if let Some(inner) = strip_parens(expr) {
            return match self.fold(guard, inner) {
                Cond::Expr(e) => Cond::Expr(wrap(e)),
                other => other,
            };
        }
        if let Some(caps) = self.defined.captures(expr) {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            return if guard.is_member(name) {
                Cond::False
            } else {
                Cond::Expr(expr.to_string())
            };
        }
        if self.ident.is_match(expr) && guard.is_member(expr) {
            return Cond::False;
        }
        match expr {
            "0" => Cond::False,
            "1" => Cond::True,
            _ if guard.mentions(expr) => Cond::Unknown,
            _ => Cond::Expr(expr.to_string()),
        }
    }

    /// `absorbing` short-circuits the operator; `neutral` terms vanish.
    fn combine(&self, guard: &Guard, terms: &[&str], op: &str, absorbing: Cond, neutral: Cond) -> Cond {
        let folded: Vec<Cond> = terms.iter().map(|t| self.fold(guard, t)).collect();
        if folded.contains(&absorbing) {
            return absorbing;
        }
        if folded.contains(&Cond::Unknown) {
            return Cond::Unknown;
        }
        let mut residual: Vec<String> = folded
            .into_iter()
            .filter_map(|c| match c {
                Cond::Expr(e) => Some(e),
                _ => None,
            })
            .collect();
        match residual.len() {
            0 => neutral,
            1 => Cond::Expr(residual.remove(0)),
            _ => Cond::Expr(residual.join(op)),
        }
    }
}

/// Fold an `#if` condition, treating every guard-family macro as undefined.
pub fn fold_condition(guard: &Guard, condition: &str) -> Result<Cond> {
    Ok(Folder::new()?.fold(guard, condition))
}

fn line_ending(line: &str) -> &str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

enum Outcome {
    Resolve(Keep),
    Rewrite(String),
}

/// Counters for one run of [`resolve_blocks`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub resolved: usize,
    pub rewritten: usize,
}

/// Block resolution over a whole file.
pub struct Resolver {
    guard: Guard,
    passes: Vec<BlockPass>,
    mode: ScanMode,
    folder: Folder,
}

impl Resolver {
    pub fn new(guard: Guard, mode: ScanMode) -> Result<Self> {
        Ok(Resolver {
            passes: passes(&guard)?,
            guard,
            mode,
            folder: Folder::new()?,
        })
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    fn decide(&self, pass: &BlockPass, line: &str) -> Outcome {
        match pass.decision {
            Decision::Fixed(keep) => Outcome::Resolve(keep),
            Decision::Classify => {
                let operand = Directive::parse(line).map(|d| d.operand).unwrap_or_default();
                match self.folder.fold(&self.guard, &operand) {
                    Cond::True => Outcome::Resolve(Keep::IfBranch),
                    Cond::False => Outcome::Resolve(Keep::ElseBranch),
                    Cond::Expr(residual) => {
                        let indent = &line[..line.len() - line.trim_start().len()];
                        Outcome::Rewrite(format!("{indent}#if {residual}{}", line_ending(line)))
                    }
                    Cond::Unknown => {
                        log::warn!(
                            "cannot fold {} condition {:?}, keeping the if-branch",
                            self.guard.token(),
                            operand
                        );
                        Outcome::Resolve(Keep::IfBranch)
                    }
                }
            }
        }
    }

    fn run_pass(&self, lines: &[String], pass: &BlockPass, stats: &mut Resolution) -> Option<Vec<String>> {
        let blocks = extract(lines, &pass.opener, self.mode);
        if blocks.is_empty() {
            return None;
        }
        log::trace!("pass {}: {} block(s)", pass.name, blocks.len());

        let mut out = Vec::with_capacity(lines.len());
        let mut cursor = 0;
        for block in &blocks {
            out.extend_from_slice(&lines[cursor..block.open]);
            match self.decide(pass, &lines[block.open]) {
                Outcome::Resolve(keep) => {
                    out.extend(resolve(lines, block, keep));
                    stats.resolved += 1;
                }
                Outcome::Rewrite(line) => {
                    out.push(line);
                    out.extend_from_slice(&lines[block.open + 1..=block.close]);
                    stats.rewritten += 1;
                }
            }
            cursor = block.close + 1;
        }
        out.extend_from_slice(&lines[cursor..]);
        Some(out)
    }

    /// Run every pass, repeatedly, until a round finds nothing to do.
    pub fn resolve_blocks(&self, mut lines: Vec<String>) -> (Vec<String>, Resolution) {
        let mut stats = Resolution::default();
        loop {
            let mut changed = false;
            for pass in &self.passes {
                if let Some(next) = self.run_pass(&lines, pass, &mut stats) {
                    lines = next;
                    changed = true;
                }
            }
            if !changed {
                return (lines, stats);
            }
        }
    }
}

/// Split text into lines that keep their terminators. A directive
/// continued with a trailing backslash stays one line together with its
/// continuation lines.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut continued = false;

    for line in text.split_inclusive('\n') {
        let merged = continued && lines.last_mut().map(|last| last.push_str(line)).is_some();
        if !merged {
            lines.push(line.to_string());
        }
        let logical = lines.last().map_or("", String::as_str);
        continued = logical.trim_start().starts_with('#')
            && line.ends_with('\n')
            && line.trim_end_matches(['\n', '\r']).ends_with('\\');
    }

    lines
}
