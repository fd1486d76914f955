//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The pattern rewrite table.
//!
//! Rules are declared as static [`RuleSpec`] values with `{GUARD}` and
//! `{guard}` placeholders and compiled against a [`Guard`] into an
//! immutable [`RuleSet`]. A rule set is applied in table order; each rule
//! sees the text produced by the rules before it.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};
use crate::guard::Guard;

/// Upper bound on re-applications of an `until_stable` rule.
const MAX_STABLE_ROUNDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleClass {
    /// Remove a conditional wrapper, keeping one branch.
    DirectiveElimination,
    /// Substitute a token inside an otherwise fixed declaration.
    TokenSubstitution,
    /// Rewrite a literal constant, reinserting captured text.
    ConstantReplacement,
    /// Reinsert text that is missing from the file.
    StructuralRestoration,
}

impl fmt::Display for RuleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            RuleClass::DirectiveElimination => "directive-elimination",
            RuleClass::TokenSubstitution => "token-substitution",
            RuleClass::ConstantReplacement => "constant-replacement",
            RuleClass::StructuralRestoration => "structural-restoration",
        })
    }
}

/// Whether `.` may cross line boundaries. `^` and `$` always match at
/// line boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    SingleLine,
    MultiLine,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Scope::SingleLine => "single-line",
            Scope::MultiLine => "multi-line",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ActionSpec {
    Replace {
        pattern: &'static str,
        replacement: &'static str,
    },
    Restore {
        marker: &'static str,
        anchor: Option<&'static str>,
        text: &'static str,
    },
}

/// Static description of a rewrite rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub class: RuleClass,
    pub scope: Scope,
    pub enabled: bool,
    pub until_stable: bool,
    /// File names the rule is restricted to; empty means every file.
    pub files: &'static [&'static str],
    pub action: ActionSpec,
}

#[derive(Debug, Clone)]
enum Action {
    Replace {
        pattern: Regex,
        replacement: String,
    },
    /// Insert `text` unless `marker` is already present: after the first
    /// match of `anchor`, or at the end of the file.
    Restore {
        marker: String,
        anchor: Option<Regex>,
        text: String,
    },
}

#[derive(Debug, Clone)]
pub struct RewriteRule {
    pub name: String,
    pub description: String,
    pub class: RuleClass,
    pub scope: Scope,
    pub enabled: bool,
    pub until_stable: bool,
    pub files: Vec<String>,
    action: Action,
}

fn compile_pattern(guard: &Guard, template: &str, scope: Scope) -> Result<Regex> {
    Ok(RegexBuilder::new(&guard.expand(template))
        .multi_line(true)
        .dot_matches_new_line(scope == Scope::MultiLine)
        .build()?)
}

impl RewriteRule {
    pub fn compile(spec: &RuleSpec, guard: &Guard) -> Result<Self> {
        let action = match spec.action {
            ActionSpec::Replace {
                pattern,
                replacement,
            } => Action::Replace {
                pattern: compile_pattern(guard, pattern, spec.scope)?,
                replacement: guard.name(replacement),
            },
            ActionSpec::Restore {
                marker,
                anchor,
                text,
            } => {
                let marker = guard.name(marker);
                let text = guard.name(text);
                if marker.is_empty() || !text.contains(&marker) {
                    return Err(Error::InvalidRule {
                        name: spec.name.to_string(),
                        reason: "restored text must contain its marker".to_string(),
                    });
                }
                let anchor = match anchor {
                    Some(a) => Some(compile_pattern(guard, a, spec.scope)?),
                    None => None,
                };
                Action::Restore {
                    marker,
                    anchor,
                    text,
                }
            }
        };

        Ok(RewriteRule {
            name: spec.name.to_string(),
            description: spec.description.to_string(),
            class: spec.class,
            scope: spec.scope,
            enabled: spec.enabled,
            until_stable: spec.until_stable,
            files: spec.files.iter().map(|f| guard.name(f)).collect(),
            action,
        })
    }

    pub fn applies_to(&self, file_name: &str) -> bool {
        if self.files.is_empty() {
            return true;
        }
        let base = Path::new(file_name)
            .file_name()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        self.files.iter().any(|f| *f == base)
    }

    fn apply_once(&self, text: &str) -> Option<String> {
        match &self.action {
            Action::Replace {
                pattern,
                replacement,
            } => {
                let out = pattern.replace_all(text, replacement.as_str());
                if out == text {
                    None
                } else {
                    Some(out.into_owned())
                }
            }
            Action::Restore {
                marker,
                anchor,
                text: restored,
            } => {
                if text.contains(marker.as_str()) {
                    return None;
                }
                match anchor {
                    Some(anchor) => {
                        let at = anchor.find(text)?.end();
                        Some(format!("{}{}{}", &text[..at], restored, &text[at..]))
                    }
                    None => Some(format!("{text}{restored}")),
                }
            }
        }
    }

    /// Apply the rule, returning the new text if anything changed.
    pub fn apply(&self, text: &str) -> Option<String> {
        let mut out = self.apply_once(text)?;
        if self.until_stable {
            for _ in 1..MAX_STABLE_ROUNDS {
                match self.apply_once(&out) {
                    Some(next) => out = next,
                    None => break,
                }
            }
        }
        Some(out)
    }
}

/// Rule names excluded for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Denylist(BTreeSet<String>);

impl Denylist {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of running the table over one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    pub fired: Vec<String>,
}

/// An ordered, immutable table of rewrite rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<RewriteRule>,
}

impl RuleSet {
    pub fn compile<'a, I>(specs: I, guard: &Guard) -> Result<Self>
    where
        I: IntoIterator<Item = &'a RuleSpec>,
    {
        let mut rules: Vec<RewriteRule> = Vec::new();
        for spec in specs {
            if rules.iter().any(|r| r.name == spec.name) {
                return Err(Error::InvalidRule {
                    name: spec.name.to_string(),
                    reason: "duplicate rule name".to_string(),
                });
            }
            rules.push(RewriteRule::compile(spec, guard)?);
        }
        Ok(RuleSet { rules })
    }

    /// The generic table shared by every profile.
    pub fn builtin(guard: &Guard) -> Result<Self> {
        Self::compile(BUILTIN_RULES, guard)
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&RewriteRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    fn check(&self, name: &str) -> Result<()> {
        match self.get(name) {
            Some(_) => Ok(()),
            None => Err(Error::UnknownRule(name.to_string())),
        }
    }

    /// A copy of the table with the named rules switched on.
    pub fn enable<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        for name in names {
            let name = name.as_ref();
            self.check(name)?;
            for rule in self.rules.iter_mut().filter(|r| r.name == name) {
                rule.enabled = true;
            }
        }
        Ok(self)
    }

    /// Build a denylist, rejecting names the table does not define.
    pub fn denylist<S: AsRef<str>>(&self, names: &[S]) -> Result<Denylist> {
        let mut set = BTreeSet::new();
        for name in names {
            self.check(name.as_ref())?;
            set.insert(name.as_ref().to_string());
        }
        Ok(Denylist(set))
    }

    pub fn apply(&self, file_name: &str, text: &str, deny: &Denylist) -> Rewrite {
        let mut current = text.to_string();
        let mut fired = Vec::new();

        for rule in &self.rules {
            if !rule.enabled || deny.contains(&rule.name) || !rule.applies_to(file_name) {
                continue;
            }
            if let Some(next) = rule.apply(&current) {
                log::debug!("{}: rule {} fired", file_name, rule.name);
                fired.push(rule.name.clone());
                current = next;
            }
        }

        Rewrite {
            text: current,
            fired,
        }
    }
}

pub static BUILTIN_RULES: &[RuleSpec] = &[
    RuleSpec {
        name: "family-defines",
        description: "Delete #define and #undef lines of guard-family macros",
        class: RuleClass::DirectiveElimination,
        scope: Scope::SingleLine,
        enabled: true,
        until_stable: false,
        files: &[],
        action: ActionSpec::Replace {
            pattern: r"^[ \t]*#[ \t]*(?:define|undef)[ \t]+{GUARD}(?:_[A-Z0-9_]+)?\b[^\n]*\n?",
            replacement: "",
        },
    },
    RuleSpec {
        name: "empty-conditional",
        description: "Delete conditionals left with no body",
        class: RuleClass::DirectiveElimination,
        scope: Scope::MultiLine,
        enabled: true,
        until_stable: true,
        files: &[],
        action: ActionSpec::Replace {
            pattern: r"^[ \t]*#[ \t]*if(?:n?def)?\b[^\n]*\n(?:[ \t]*\n)*[ \t]*#[ \t]*endif\b[^\n]*(?:\n|\z)",
            replacement: "",
        },
    },
    RuleSpec {
        name: "version-string",
        description: "Strip the guard from VERSION and PACKAGE strings",
        class: RuleClass::ConstantReplacement,
        scope: Scope::SingleLine,
        enabled: true,
        until_stable: false,
        files: &[],
        action: ActionSpec::Replace {
            pattern: r#"(#[ \t]*define[ \t]+(?:VERSION|PACKAGE)[ \t]+"[^"\n]*?)[ \t]*\b{GUARD}\b[ \t]*""#,
            replacement: r#"${1}""#,
        },
    },
    RuleSpec {
        name: "version-suffix",
        description: "Drop \", GUARD version\" from banners",
        class: RuleClass::ConstantReplacement,
        scope: Scope::SingleLine,
        enabled: true,
        until_stable: false,
        files: &[],
        action: ActionSpec::Replace {
            pattern: r",[ \t]*{GUARD}[ \t]+version\b",
            replacement: "",
        },
    },
    RuleSpec {
        name: "qsort-include",
        description: "Delete includes of the guard qsort header",
        class: RuleClass::DirectiveElimination,
        scope: Scope::SingleLine,
        enabled: true,
        until_stable: false,
        files: &[],
        action: ActionSpec::Replace {
            pattern: r#"^[ \t]*#[ \t]*include[ \t]+"{guard}_qsort\.h"[^\n]*\n?"#,
            replacement: "",
        },
    },
    RuleSpec {
        name: "qsort-call",
        description: "Call the C library qsort",
        class: RuleClass::TokenSubstitution,
        scope: Scope::SingleLine,
        enabled: true,
        until_stable: false,
        files: &[],
        action: ActionSpec::Replace {
            pattern: r"\b{guard}_qsort[ \t]*\(",
            replacement: "qsort(",
        },
    },
    RuleSpec {
        name: "prid64-format",
        description: "Replace PRId64 format macros with %ld",
        class: RuleClass::TokenSubstitution,
        scope: Scope::SingleLine,
        enabled: false,
        until_stable: false,
        files: &[],
        action: ActionSpec::Replace {
            pattern: r#"%"[ \t]*PRId64[ \t]*""#,
            replacement: "%ld",
        },
    },
];
