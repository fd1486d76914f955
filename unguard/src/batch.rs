//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The batch driver: one unit at a time, load, transform, audit, build,
//! and route the result to `pass/` or `fail/`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::audit::{audit_sources, audit_tree, AuditReport};
use crate::builder::{has_entry_point, run_build, BuildConfig, BuildOutcome};
use crate::config::Config;
use crate::engine::{Engine, FileReport};
use crate::error::{Error, Result};
use crate::profiles::{self, Profile};
use crate::tree::{SourceFilter, SourceTree};

pub const PASS_DIR: &str = "pass";
pub const FAIL_DIR: &str = "fail";
pub const STAGING_DIR: &str = ".staging";

/// A top-level source tree processed end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub root: PathBuf,
}

/// The immediate subdirectories of `source_root`, sorted by name,
/// optionally restricted to the one called `only`.
pub fn discover_units(source_root: &Path, only: Option<&str>) -> Result<Vec<Unit>> {
    if !source_root.is_dir() {
        return Err(Error::MissingInput(source_root.to_path_buf()));
    }

    let mut units = Vec::new();
    for entry in fs::read_dir(source_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if only.map_or(true, |o| o == name) {
            units.push(Unit {
                name,
                root: entry.path(),
            });
        }
    }
    units.sort_by(|a, b| a.name.cmp(&b.name));

    if units.is_empty() {
        return Err(Error::NoUnits(source_root.to_path_buf()));
    }
    Ok(units)
}

/// Target subtrees of a unit, outermost first. A target nested inside
/// another target is covered by it and not listed.
pub fn target_dirs(tree: &SourceTree, config: &Config) -> Vec<PathBuf> {
    let mut targets: Vec<PathBuf> = Vec::new();
    for dir in tree.dirs() {
        let matches = dir
            .file_name()
            .map_or(false, |n| config.is_target_name(&n.to_string_lossy()));
        if matches && !targets.iter().any(|t| dir.starts_with(t)) {
            targets.push(dir.to_path_buf());
        }
    }
    targets
}

/// Why a unit failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Unreadable unit, no target subtree, or missing template.
    Input,
    /// The output could not be written or moved.
    Output,
    /// Guard tokens survived.
    Leftovers,
    /// No entry point, or the build tool failed or timed out.
    Build,
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub unit: String,
    /// No guard token remains in the unit.
    pub resolved: bool,
    /// `None` when no build was attempted.
    pub buildable: Option<bool>,
    pub failure: Option<Failure>,
    pub diagnostic: String,
    /// Tree edits other than source rewrites, in the order performed.
    pub actions: Vec<String>,
    /// Source files the engine changed.
    pub files: Vec<(PathBuf, FileReport)>,
    /// Source files left alone because they could not be decoded.
    pub skipped: Vec<(PathBuf, String)>,
    /// Leftover tokens, keyed by `<unit>/<relative path>`.
    pub findings: AuditReport,
    /// Where the unit's output ended up.
    pub destination: Option<PathBuf>,
}

impl BatchResult {
    fn new(unit: &str) -> Self {
        BatchResult {
            unit: unit.to_string(),
            resolved: false,
            buildable: None,
            failure: None,
            diagnostic: String::new(),
            actions: Vec::new(),
            files: Vec::new(),
            skipped: Vec::new(),
            findings: AuditReport::new(),
            destination: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    /// Record a failure. The first failure decides the category; later
    /// diagnostics are appended.
    fn fail(&mut self, failure: Failure, diagnostic: String) {
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
        if !self.diagnostic.is_empty() {
            self.diagnostic.push('\n');
        }
        self.diagnostic.push_str(&diagnostic);
    }
}

#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub results: Vec<BatchResult>,
}

impl Summary {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    /// 0 when every unit passed; 1 when every unit failed or any unit failed
    /// for a reason other than its build; 2 when only builds failed.
    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 {
            return 0;
        }
        if self.passed() == 0 {
            return 1;
        }
        let hard = self
            .results
            .iter()
            .any(|r| matches!(r.failure, Some(f) if f != Failure::Build));
        if hard {
            1
        } else {
            2
        }
    }
}

/// Move a staged unit into `bucket`. Copies of the unit left in either
/// bucket by an earlier run are removed first.
fn publish(staging: &Path, output: &Path, bucket: &str, unit: &str) -> io::Result<PathBuf> {
    for previous in [PASS_DIR, FAIL_DIR].map(|b| output.join(b).join(unit)) {
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }
    }
    let dest = output.join(bucket).join(unit);
    fs::create_dir_all(output.join(bucket))?;
    fs::rename(staging, &dest)?;
    Ok(dest)
}

/// Runs every unit of a source root through the engine.
pub struct Batch<'a> {
    config: &'a Config,
    engine: Engine,
    profile: &'static Profile,
    filter: SourceFilter,
}

impl<'a> Batch<'a> {
    /// Validates the configuration: guard, profile and rule names.
    pub fn new(config: &'a Config) -> Result<Self> {
        let profile = profiles::find(&config.profile)?;
        Ok(Batch {
            config,
            engine: Engine::from_config(config)?,
            profile,
            filter: config.source_filter(profile.extensions),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn filter(&self) -> &SourceFilter {
        &self.filter
    }

    /// Process every unit, calling `on_unit` as each one finishes. Unit
    /// failures are recorded in the summary; only a missing source root,
    /// an empty one, or an unwritable output root are errors.
    pub fn run<F: FnMut(&BatchResult)>(&self, mut on_unit: F) -> Result<Summary> {
        let units = discover_units(&self.config.source_root, self.config.unit.as_deref())?;

        if !self.config.dry_run {
            for dir in [PASS_DIR, FAIL_DIR, STAGING_DIR] {
                fs::create_dir_all(self.config.output_root.join(dir))?;
            }
        }

        let mut summary = Summary::default();
        for unit in &units {
            let result = self.process_unit(unit);
            on_unit(&result);
            summary.results.push(result);
        }

        if !self.config.dry_run {
            // only succeeds once every unit has moved out
            let _ = fs::remove_dir(self.config.output_root.join(STAGING_DIR));
        }
        Ok(summary)
    }

    pub fn process_unit(&self, unit: &Unit) -> BatchResult {
        log::debug!("processing unit {}", unit.name);
        let mut result = BatchResult::new(&unit.name);

        let mut tree = match SourceTree::load(&unit.root) {
            Ok(tree) => tree,
            Err(e) => {
                result.fail(Failure::Input, format!("cannot read {}: {}", unit.root.display(), e));
                return result;
            }
        };

        let targets = target_dirs(&tree, self.config);
        if targets.is_empty() {
            result.fail(Failure::Input, "no target directories found".to_string());
            self.finish(unit, &tree, &mut result);
            return result;
        }

        let template = match &self.config.makefile {
            Some(path) => match fs::read(path) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    result.fail(
                        Failure::Input,
                        format!("cannot read build descriptor template {}: {}", path.display(), e),
                    );
                    self.finish(unit, &tree, &mut result);
                    return result;
                }
            },
            None => None,
        };

        for target in &targets {
            self.prepare_target(&mut tree, target, template.as_deref(), &mut result);
        }
        self.transform(&mut tree, &targets, &mut result);

        let guard = self.engine.guard();
        result.findings = audit_sources(guard, &tree, &self.filter)
            .into_iter()
            .map(|(path, findings)| (Path::new(&unit.name).join(path), findings))
            .collect();

        if self.config.dry_run {
            result.resolved = result.findings.is_empty();
            if !result.resolved {
                result.fail(Failure::Leftovers, "leftover tokens found".to_string());
            }
            return result;
        }

        self.finish(unit, &tree, &mut result);
        result
    }

    fn prepare_target(
        &self,
        tree: &mut SourceTree,
        target: &Path,
        template: Option<&[u8]>,
        result: &mut BatchResult,
    ) {
        let guard = self.engine.guard();

        for name in self.profile.drop_files {
            for path in tree.remove_named_under(target, &guard.name(name)) {
                result.actions.push(format!("removed {}", path.display()));
            }
        }

        for (from, to) in self.profile.renames {
            let from = guard.name(from);
            let matches: Vec<PathBuf> = tree
                .files_under(target)
                .filter(|p| p.file_name().map_or(false, |f| f == from.as_str()))
                .map(Path::to_path_buf)
                .collect();
            for path in matches {
                let dest = path.with_file_name(guard.name(to));
                if tree.rename(&path, &dest) {
                    result
                        .actions
                        .push(format!("renamed {} to {}", path.display(), dest.display()));
                } else {
                    log::warn!("cannot rename {}: {} exists", path.display(), dest.display());
                }
            }
        }

        let descriptor = &self.config.descriptor_name;
        for path in tree.remove_named_under(target, descriptor) {
            result.actions.push(format!("removed {}", path.display()));
        }
        if let Some(bytes) = template {
            let path = target.join(descriptor);
            tree.insert(path.clone(), bytes.to_vec());
            result.actions.push(format!("installed {}", path.display()));
        }
    }

    fn transform(&self, tree: &mut SourceTree, targets: &[PathBuf], result: &mut BatchResult) {
        let sources: Vec<PathBuf> = targets
            .iter()
            .flat_map(|t| tree.sources_under(t, &self.filter))
            .map(Path::to_path_buf)
            .collect();

        for path in sources {
            let processed = {
                let Some(bytes) = tree.contents(&path) else {
                    continue;
                };
                match std::str::from_utf8(bytes) {
                    Ok(text) => self.engine.process(&path.to_string_lossy(), text),
                    Err(e) => {
                        log::warn!("{}: not valid UTF-8, left unchanged", path.display());
                        result.skipped.push((path, format!("not valid UTF-8: {}", e)));
                        continue;
                    }
                }
            };
            if processed.report.changed() {
                tree.insert(path.clone(), processed.text.into_bytes());
                result.files.push((path, processed.report));
            }
        }
    }

    /// Flush to staging, audit the written copy, build, and move the unit
    /// to its destination.
    fn finish(&self, unit: &Unit, tree: &SourceTree, result: &mut BatchResult) {
        if self.config.dry_run {
            return;
        }
        let output = &self.config.output_root;
        let staging = output.join(STAGING_DIR).join(&unit.name);

        let flushed = (|| -> Result<()> {
            if staging.exists() {
                fs::remove_dir_all(&staging)?;
            }
            tree.flush(&staging)
        })();
        if let Err(e) = flushed {
            result.fail(Failure::Output, format!("cannot write {}: {}", staging.display(), e));
            return;
        }

        if result.failure.is_none() {
            self.audit_written(unit, &staging, result);
        }
        if result.failure.is_none() && self.config.build {
            self.build(tree, &staging, result);
        }

        let bucket = if result.passed() { PASS_DIR } else { FAIL_DIR };
        match publish(&staging, output, bucket, &unit.name) {
            Ok(dest) => result.destination = Some(dest),
            Err(e) => result.fail(
                Failure::Output,
                format!("cannot move {} to {}: {}", unit.name, bucket, e),
            ),
        }
    }

    fn audit_written(&self, unit: &Unit, staging: &Path, result: &mut BatchResult) {
        match audit_tree(self.engine.guard(), staging, &self.filter) {
            Ok(report) => {
                for (path, findings) in report {
                    let rel = path.strip_prefix(staging).unwrap_or(&path);
                    result.findings.insert(Path::new(&unit.name).join(rel), findings);
                }
                result.resolved = result.findings.is_empty();
                if !result.resolved {
                    result.fail(Failure::Leftovers, "leftover tokens found".to_string());
                }
            }
            Err(e) => result.fail(Failure::Output, format!("cannot audit {}: {}", staging.display(), e)),
        }
    }

    fn build(&self, tree: &SourceTree, staging: &Path, result: &mut BatchResult) {
        let build = BuildConfig {
            program: self.config.make_program.clone(),
            args: Vec::new(),
            timeout: self.config.build_timeout,
        };
        let mut buildable = true;

        for target in target_dirs(tree, self.config) {
            if tree.get(&target.join(&self.config.descriptor_name)).is_none() {
                log::debug!("{}: no build descriptor, not building", target.display());
                continue;
            }
            match has_entry_point(tree, &target, &self.filter) {
                Ok(true) => {}
                Ok(false) => {
                    buildable = false;
                    result.fail(Failure::Build, format!("{}: no main() found", target.display()));
                    continue;
                }
                Err(e) => {
                    buildable = false;
                    result.fail(Failure::Build, e.to_string());
                    continue;
                }
            }
            match run_build(&build, &staging.join(&target)) {
                Ok(BuildOutcome::Succeeded) => {}
                Ok(BuildOutcome::Failed { status, output }) => {
                    buildable = false;
                    let status = status.map_or("signal".to_string(), |s| s.to_string());
                    result.fail(
                        Failure::Build,
                        format!("{}: build failed ({})\n{}", target.display(), status, output.trim_end()),
                    );
                }
                Ok(BuildOutcome::TimedOut { output }) => {
                    buildable = false;
                    result.fail(
                        Failure::Build,
                        format!(
                            "{}: build timed out after {:?}\n{}",
                            target.display(),
                            build.timeout,
                            output.trim_end()
                        ),
                    );
                }
                Err(e) => {
                    buildable = false;
                    result.fail(Failure::Build, format!("{}: {}", target.display(), e));
                }
            }
        }

        result.buildable = Some(buildable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plib::testing::FixtureTree;
    use std::time::Duration;

    fn config(fixture: &FixtureTree) -> Config {
        Config {
            source_root: fixture.join("cpu"),
            output_root: fixture.join("out"),
            ..Config::default()
        }
    }

    fn result_for<'r>(summary: &'r Summary, unit: &str) -> &'r BatchResult {
        summary.results.iter().find(|r| r.unit == unit).unwrap()
    }

    #[test]
    fn discovers_sorted_units() {
        let fixture = FixtureTree::new();
        fixture.dir("cpu/b").dir("cpu/a").file("cpu/readme", "x");
        let units = discover_units(&fixture.join("cpu"), None).unwrap();
        let names: Vec<&str> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let only = discover_units(&fixture.join("cpu"), Some("b")).unwrap();
        assert_eq!(only.len(), 1);
        assert!(matches!(
            discover_units(&fixture.join("cpu"), Some("c")),
            Err(Error::NoUnits(_))
        ));
        assert!(matches!(
            discover_units(&fixture.join("nope"), None),
            Err(Error::MissingInput(_))
        ));
    }

    #[test]
    fn nested_targets_are_covered() {
        let mut tree = SourceTree::new();
        tree.insert("build/build_base_x/src/a.c", Vec::new());
        tree.insert("src/a.c", Vec::new());
        tree.insert("data/b.c", Vec::new());
        let targets = target_dirs(&tree, &Config::default());
        assert_eq!(
            targets,
            vec![PathBuf::from("build/build_base_x"), PathBuf::from("src")]
        );
    }

    #[test]
    fn pass_and_fail_routing() {
        let fixture = FixtureTree::new();
        fixture
            .file("cpu/500.good/src/main.c", "#ifdef SPEC\nspec();\n#else\nplain();\n#endif\n")
            .file("cpu/500.good/src/Makefile", "old\n")
            .file("cpu/500.good/data/input.txt", "SPEC data\n")
            .file("cpu/600.bare/docs/readme", "nothing\n")
            .file("Makefile.tmpl", "all:\n\ttrue\n");
        let config = Config {
            makefile: Some(fixture.join("Makefile.tmpl")),
            ..config(&fixture)
        };

        let batch = Batch::new(&config).unwrap();
        let mut seen = Vec::new();
        let summary = batch.run(|r| seen.push(r.unit.clone())).unwrap();
        assert_eq!(seen, vec!["500.good", "600.bare"]);

        let good = result_for(&summary, "500.good");
        assert!(good.passed(), "{}", good.diagnostic);
        assert!(good.resolved);
        assert_eq!(good.buildable, None);
        assert_eq!(fixture.read("out/pass/500.good/src/main.c"), "plain();\n");
        assert_eq!(fixture.read("out/pass/500.good/src/Makefile"), "all:\n\ttrue\n");
        // non-source files are copied unchanged
        assert_eq!(fixture.read("out/pass/500.good/data/input.txt"), "SPEC data\n");

        let bare = result_for(&summary, "600.bare");
        assert_eq!(bare.failure, Some(Failure::Input));
        assert!(fixture.exists("out/fail/600.bare/docs/readme"));

        assert!(!fixture.exists("out/.staging"));
        assert_eq!(summary.exit_code(), 1);
        // the source tree is never modified
        assert_eq!(fixture.read("cpu/500.good/src/Makefile"), "old\n");
    }

    #[test]
    fn rerun_moves_unit_between_buckets() {
        let fixture = FixtureTree::new();
        fixture.file("cpu/u/src/a.c", "#ifdef SPEC\nx();\n#endif\n");
        let config = config(&fixture);

        let summary = Batch::new(&config).unwrap().run(|_| {}).unwrap();
        assert!(summary.results[0].passed());
        assert!(fixture.exists("out/pass/u/src/a.c"));

        fixture.file("cpu/u/include/b.h", "#define N SPEC_N\n");
        let summary = Batch::new(&config).unwrap().run(|_| {}).unwrap();
        assert_eq!(summary.results[0].failure, Some(Failure::Leftovers));
        assert!(fixture.exists("out/fail/u/include/b.h"));
        assert!(!fixture.exists("out/pass/u"));

        fs::remove_file(fixture.join("cpu/u/include/b.h")).unwrap();
        let summary = Batch::new(&config).unwrap().run(|_| {}).unwrap();
        assert!(summary.results[0].passed());
        assert!(!fixture.exists("out/fail/u"));
        assert!(!fixture.exists("out/pass/u/include/b.h"));
        assert_eq!(fixture.read("out/pass/u/src/a.c"), "");
    }

    #[test]
    fn missing_template_is_an_input_error() {
        let fixture = FixtureTree::new();
        fixture.file("cpu/u/src/a.c", "int a;\n");
        let config = Config {
            makefile: Some(fixture.join("nope")),
            ..config(&fixture)
        };
        let summary = Batch::new(&config).unwrap().run(|_| {}).unwrap();
        assert_eq!(summary.results[0].failure, Some(Failure::Input));
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn leftovers_outside_targets_fail_the_unit() {
        let fixture = FixtureTree::new();
        fixture
            .file("cpu/u/src/a.c", "int a;\n")
            .file("cpu/u/include/b.h", "#define X SPEC_Y\n");
        let summary = Batch::new(&config(&fixture)).unwrap().run(|_| {}).unwrap();
        let result = &summary.results[0];
        assert_eq!(result.failure, Some(Failure::Leftovers));
        assert!(!result.resolved);
        let findings = &result.findings[Path::new("u/include/b.h")];
        assert_eq!(findings[0].line_no, 1);
        assert!(fixture.exists("out/fail/u/include/b.h"));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let fixture = FixtureTree::new();
        fixture
            .file("cpu/u/src/a.c", "#ifndef SPEC\nkeep();\n#endif\n")
            .file("cpu/u/src/Makefile", "old\n");
        let config = Config {
            dry_run: true,
            ..config(&fixture)
        };
        let summary = Batch::new(&config).unwrap().run(|_| {}).unwrap();
        let result = &summary.results[0];
        assert!(result.passed());
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].1.blocks_resolved, 1);
        assert_eq!(result.actions, vec!["removed src/Makefile"]);
        assert!(!fixture.exists("out"));
        assert_eq!(fixture.read("cpu/u/src/a.c"), "#ifndef SPEC\nkeep();\n#endif\n");
    }

    #[test]
    fn undecodable_files_are_skipped() {
        let fixture = FixtureTree::new();
        fixture.dir("cpu/u/src");
        fs::write(fixture.join("cpu/u/src/bin.c"), b"\xff\xfe int x;\n").unwrap();
        let summary = Batch::new(&config(&fixture)).unwrap().run(|_| {}).unwrap();
        let result = &summary.results[0];
        assert!(result.passed());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(
            fs::read(fixture.join("out/pass/u/src/bin.c")).unwrap(),
            b"\xff\xfe int x;\n"
        );
    }

    #[test]
    fn namd_profile_renames_and_widens_extensions() {
        let fixture = FixtureTree::new();
        fixture.file("cpu/namd/src/spec_namd.C", "#ifdef SPEC\nx();\n#endif\nint main() {}\n");
        let config = Config {
            profile: "namd".to_string(),
            ..config(&fixture)
        };
        let summary = Batch::new(&config).unwrap().run(|_| {}).unwrap();
        assert!(summary.results[0].passed());
        assert_eq!(fixture.read("out/pass/namd/src/main.C"), "int main() {}\n");
        assert!(!fixture.exists("out/pass/namd/src/spec_namd.C"));
    }

    #[test]
    fn build_outcomes() {
        let fixture = FixtureTree::new();
        fixture
            .file("cpu/ok/src/main.c", "int main(void) { return 0; }\n")
            .file("cpu/nomain/src/lib.c", "int f(void) { return 0; }\n")
            .file("Makefile.tmpl", "all:\n");
        let config = Config {
            makefile: Some(fixture.join("Makefile.tmpl")),
            build: true,
            make_program: "true".to_string(),
            build_timeout: Duration::from_secs(30),
            ..config(&fixture)
        };
        let summary = Batch::new(&config).unwrap().run(|_| {}).unwrap();

        let ok = result_for(&summary, "ok");
        assert_eq!(ok.buildable, Some(true));
        assert!(ok.passed());

        let nomain = result_for(&summary, "nomain");
        assert_eq!(nomain.buildable, Some(false));
        assert_eq!(nomain.failure, Some(Failure::Build));
        assert!(fixture.exists("out/fail/nomain/src/lib.c"));

        assert_eq!(summary.exit_code(), 2);
    }

    #[test]
    fn exit_codes() {
        let result = |failure| BatchResult {
            failure,
            ..BatchResult::new("u")
        };
        let summary = |failures: Vec<Option<Failure>>| Summary {
            results: failures.into_iter().map(|f| result(f)).collect(),
        };
        assert_eq!(summary(vec![None, None]).exit_code(), 0);
        assert_eq!(summary(vec![Some(Failure::Build)]).exit_code(), 1);
        assert_eq!(summary(vec![None, Some(Failure::Build)]).exit_code(), 2);
        assert_eq!(summary(vec![None, Some(Failure::Leftovers)]).exit_code(), 1);
        assert_eq!(summary(vec![None, Some(Failure::Input)]).exit_code(), 1);
    }

    #[test]
    fn invalid_configuration() {
        let bad_guard = Config {
            guard: "1X".to_string(),
            ..Config::default()
        };
        assert!(matches!(Batch::new(&bad_guard), Err(Error::InvalidGuard(_))));
        let bad_rule = Config {
            deny_rules: vec!["nope".to_string()],
            ..Config::default()
        };
        assert!(matches!(Batch::new(&bad_rule), Err(Error::UnknownRule(_))));
        let bad_profile = Config {
            profile: "nope".to_string(),
            ..Config::default()
        };
        assert!(matches!(Batch::new(&bad_profile), Err(Error::UnknownProfile(_))));
    }
}
