//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use std::path::PathBuf;
use std::time::Duration;

use crate::guard::DEFAULT_GUARD;
use crate::scanner::ScanMode;
use crate::tree::SourceFilter;

/// Represents the configuration of one batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The sentinel macro whose blocks are resolved
    pub guard: String,
    /// Name of the rule profile
    pub profile: String,
    pub scan_mode: ScanMode,
    /// Extensions of the files the engine rewrites
    pub extensions: Vec<String>,
    /// Directory names that mark a target subtree
    pub target_names: Vec<String>,
    /// Directory name prefixes that mark a target subtree
    pub target_prefixes: Vec<String>,
    /// File name of the build descriptor
    pub descriptor_name: String,
    /// Template installed as the build descriptor of each target
    pub makefile: Option<PathBuf>,
    /// Whether to run the build tool on each target
    pub build: bool,
    pub make_program: String,
    pub build_timeout: Duration,
    /// Rewrite rules excluded for this run
    pub deny_rules: Vec<String>,
    /// Disabled rewrite rules switched on for this run
    pub enable_rules: Vec<String>,
    /// Process only the unit with this name
    pub unit: Option<String>,
    /// Whether to report intended changes without writing anything
    pub dry_run: bool,
    pub verbose: bool,
    pub quiet: bool,

    pub source_root: PathBuf,
    pub output_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            guard: DEFAULT_GUARD.to_string(),
            profile: "generic".to_string(),
            scan_mode: ScanMode::Nested,
            extensions: vec!["c", "h", "cpp", "hpp", "cc", "cxx"]
                .into_iter()
                .map(String::from)
                .collect(),
            target_names: vec!["src".to_string()],
            target_prefixes: vec!["build_base_".to_string()],
            descriptor_name: "Makefile".to_string(),
            makefile: None,
            build: false,
            make_program: "make".to_string(),
            build_timeout: Duration::from_secs(120),
            deny_rules: Vec::new(),
            enable_rules: Vec::new(),
            unit: None,
            dry_run: false,
            verbose: false,
            quiet: false,
            source_root: PathBuf::new(),
            output_root: PathBuf::new(),
        }
    }
}

impl Config {
    /// Source filter for the configured extensions plus `extra`.
    pub fn source_filter(&self, extra: &[&str]) -> SourceFilter {
        SourceFilter::new(
            self.extensions
                .iter()
                .map(String::as_str)
                .chain(extra.iter().copied()),
        )
    }

    /// Whether a directory name marks a target subtree.
    pub fn is_target_name(&self, name: &str) -> bool {
        self.target_names.iter().any(|n| n == name)
            || self.target_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}
