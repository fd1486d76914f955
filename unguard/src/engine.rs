//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The per-file pipeline: block resolution, rewrite table, residual sweep.

use crate::config::Config;
use crate::error::Result;
use crate::guard::Guard;
use crate::policy::{split_lines, Resolver};
use crate::profiles;
use crate::rules::{Denylist, RuleSet};
use crate::scanner::ScanMode;
use crate::sweep::sweep;

/// Upper bound on pipeline repetitions for one file.
const MAX_ROUNDS: usize = 4;

/// What the pipeline did to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub blocks_resolved: usize,
    pub conditions_rewritten: usize,
    /// Rule names in the order they first fired.
    pub rules_fired: Vec<String>,
    pub tokens_swept: usize,
}

impl FileReport {
    pub fn changed(&self) -> bool {
        self.blocks_resolved > 0
            || self.conditions_rewritten > 0
            || !self.rules_fired.is_empty()
            || self.tokens_swept > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub text: String,
    pub report: FileReport,
}

/// The conditional-block resolution engine. Holds only immutable data, so
/// one engine can serve any number of files.
pub struct Engine {
    resolver: Resolver,
    rules: RuleSet,
    deny: Denylist,
}

impl Engine {
    pub fn new(guard: Guard, rules: RuleSet, mode: ScanMode, deny: Denylist) -> Result<Self> {
        Ok(Engine {
            resolver: Resolver::new(guard, mode)?,
            rules,
            deny,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let guard = Guard::new(&config.guard)?;
        let rules = profiles::find(&config.profile)?
            .rule_set(&guard)?
            .enable(&config.enable_rules)?;
        let deny = rules.denylist(&config.deny_rules)?;
        Engine::new(guard, rules, config.scan_mode, deny)
    }

    pub fn guard(&self) -> &Guard {
        self.resolver.guard()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn denylist(&self) -> &Denylist {
        &self.deny
    }

    /// Run the pipeline with the engine's own denylist.
    pub fn process(&self, file_name: &str, text: &str) -> Processed {
        self.process_with(file_name, text, &self.deny)
    }

    /// Run the pipeline with a denylist chosen by the caller.
    pub fn process_with(&self, file_name: &str, text: &str, deny: &Denylist) -> Processed {
        let mut report = FileReport::default();
        let mut current = text.to_string();

        for round in 1..=MAX_ROUNDS {
            let (lines, resolution) = self.resolver.resolve_blocks(split_lines(&current));
            report.blocks_resolved += resolution.resolved;
            report.conditions_rewritten += resolution.rewritten;

            let rewrite = self.rules.apply(file_name, &lines.concat(), deny);
            for name in rewrite.fired {
                if !report.rules_fired.contains(&name) {
                    report.rules_fired.push(name);
                }
            }

            let (swept, count) = sweep(self.guard(), &rewrite.text);
            report.tokens_swept += count;

            if swept == current {
                break;
            }
            current = swept;
            if round == MAX_ROUNDS {
                log::warn!("{}: output still changing after {} rounds", file_name, round);
            }
        }

        log::trace!("{}: {:?}", file_name, report);
        Processed {
            text: current,
            report,
        }
    }
}
