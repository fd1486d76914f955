//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use gettextrs::{bind_textdomain_codeset, gettext, setlocale, textdomain, LocaleCategory};
use plib::PROJECT_NAME;
use unguard::audit::{audit_text, write_report, AuditReport};
use unguard::batch::{Batch, BatchResult};
use unguard::guard::DEFAULT_GUARD;
use unguard::scanner::ScanMode;
use unguard::{Config, Engine};

/// unguard - resolve guard-token conditional blocks in C/C++ source trees
#[derive(Parser)]
#[command(version, about = gettext("unguard - resolve guard-token conditional blocks in C/C++ source trees"))]
struct Args {
    #[arg(short, long, default_value = DEFAULT_GUARD, help = gettext("Guard token whose conditional blocks are resolved"))]
    guard: String,

    #[arg(short, long, default_value = "generic", help = gettext("Rule profile: generic, mcf, lbm, deepsjeng or namd"))]
    profile: String,

    #[arg(short, long, help = gettext("Build descriptor template installed in every target directory"))]
    makefile: Option<PathBuf>,

    #[arg(short, long, help = gettext("Run the build tool in every target directory"))]
    build: bool,

    #[arg(long, default_value = "make", help = gettext("Build tool to run"))]
    make_program: String,

    #[arg(short, long, default_value = "120", value_parser = parse_duration,
          help = gettext("Build timeout, with an optional s, m, h or d suffix"))]
    timeout: Duration,

    #[arg(short, long = "deny-rule", value_name = "RULE", help = gettext("Exclude a rewrite rule (repeatable)"))]
    deny_rule: Vec<String>,

    #[arg(short, long = "enable-rule", value_name = "RULE", help = gettext("Enable a rule that is off by default (repeatable)"))]
    enable_rule: Vec<String>,

    #[arg(long, help = gettext("Scan without tracking nested conditionals"))]
    flat: bool,

    #[arg(short, long, help = gettext("Process only the named unit"))]
    unit: Option<String>,

    #[arg(short = 'n', long, help = gettext("Report intended changes without writing anything"))]
    dry_run: bool,

    #[arg(short, long, conflicts_with = "quiet", help = gettext("Report every change"))]
    verbose: bool,

    #[arg(short, long, help = gettext("Report nothing but errors"))]
    quiet: bool,

    #[arg(long, help = gettext("Print the rewrite rules of the selected profile and exit"))]
    list_rules: bool,

    #[arg(required_unless_present = "list_rules",
          help = gettext("Source root, or - to filter standard input to standard output"))]
    source: Option<PathBuf>,

    #[arg(help = gettext("Output root"))]
    output: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            guard: self.guard.clone(),
            profile: self.profile.clone(),
            scan_mode: if self.flat {
                ScanMode::Flat
            } else {
                ScanMode::Nested
            },
            makefile: self.makefile.clone(),
            build: self.build,
            make_program: self.make_program.clone(),
            build_timeout: self.timeout,
            deny_rules: self.deny_rule.clone(),
            enable_rules: self.enable_rule.clone(),
            unit: self.unit.clone(),
            dry_run: self.dry_run,
            verbose: self.verbose,
            quiet: self.quiet,
            source_root: self.source.clone().unwrap_or_default(),
            output_root: self.output.clone().unwrap_or_default(),
            ..Config::default()
        }
    }
}

/// Build timeout: a non-negative number of seconds, or of minutes, hours
/// or days with an `m`, `h` or `d` suffix. `s` is accepted for seconds.
fn parse_duration(arg: &str) -> Result<Duration, String> {
    let invalid = || format!("{}: '{}'", gettext("invalid duration"), arg);

    let unit_len = match arg.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => 1,
        _ => 0,
    };
    let (number, unit) = arg.split_at(arg.len() - unit_len);
    let scale = match unit {
        "" | "s" => 1.0,
        "m" => 60.0,
        "h" => 60.0 * 60.0,
        "d" => 24.0 * 60.0 * 60.0,
        _ => return Err(invalid()),
    };

    let seconds = number.parse::<f64>().map_err(|_| invalid())? * scale;
    Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
}

fn list_rules(engine: &Engine) {
    for rule in engine.rules().rules() {
        let state = if engine.denylist().contains(&rule.name) {
            gettext("denied")
        } else if rule.enabled {
            gettext("enabled")
        } else {
            gettext("disabled")
        };
        println!(
            "{:<26} {:<23} {:<12} {:<9} {}",
            rule.name, rule.class, rule.scope, state, rule.description
        );
    }
}

/// Filter mode: one file from standard input to standard output.
fn filter_stdin(engine: &Engine) -> io::Result<i32> {
    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;

    let processed = engine.process("-", &text);
    io::stdout().write_all(processed.text.as_bytes())?;

    let findings = audit_text(engine.guard(), &processed.text);
    if findings.is_empty() {
        return Ok(0);
    }
    let report = AuditReport::from([(PathBuf::from("-"), findings)]);
    write_report(&mut io::stderr(), engine.guard(), &report)?;
    Ok(1)
}

fn report_unit<W: Write>(
    out: &mut W,
    config: &Config,
    engine: &Engine,
    result: &BatchResult,
) -> io::Result<()> {
    if config.quiet {
        return Ok(());
    }

    let status = if result.passed() {
        gettext("PASS")
    } else {
        gettext("FAIL")
    };
    match &result.destination {
        Some(dest) => writeln!(out, "{}: {} ({})", result.unit, status, dest.display())?,
        None => writeln!(out, "{}: {}", result.unit, status)?,
    }

    if config.verbose || config.dry_run {
        for action in &result.actions {
            writeln!(out, "  {}", action)?;
        }
        for (path, report) in &result.files {
            writeln!(
                out,
                "  {} {}: {} {}, {} {}, {} {}",
                gettext("rewrote"),
                path.display(),
                report.blocks_resolved,
                gettext("block(s) resolved"),
                report.conditions_rewritten,
                gettext("condition(s) rewritten"),
                report.tokens_swept,
                gettext("token(s) swept")
            )?;
            if config.verbose && !report.rules_fired.is_empty() {
                writeln!(
                    out,
                    "    {}: {}",
                    gettext("rules"),
                    report.rules_fired.join(", ")
                )?;
            }
        }
    }
    for (path, reason) in &result.skipped {
        eprintln!("  {} {}: {}", gettext("skipped"), path.display(), reason);
    }

    if !result.passed() {
        for line in result.diagnostic.lines() {
            eprintln!("  {}", line);
        }
    }
    if !result.findings.is_empty() {
        write_report(out, engine.guard(), &result.findings)?;
    }
    Ok(())
}

fn run(args: &Args) -> unguard::Result<i32> {
    let config = args.config();

    if args.list_rules {
        list_rules(&Engine::from_config(&config)?);
        return Ok(0);
    }

    if args.source.as_deref() == Some(Path::new("-")) {
        return Ok(filter_stdin(&Engine::from_config(&config)?)?);
    }

    if args.output.is_none() && !config.dry_run {
        eprintln!("unguard: {}", gettext("missing output directory operand"));
        return Ok(1);
    }

    let batch = Batch::new(&config)?;
    let mut write_error = None;
    let summary = batch.run(|result| {
        if let Err(e) = report_unit(&mut io::stdout().lock(), &config, batch.engine(), result) {
            write_error.get_or_insert(e);
        }
    })?;
    if let Some(e) = write_error {
        return Err(e.into());
    }

    if !config.quiet {
        writeln!(
            io::stdout(),
            "{} {}, {} {}",
            summary.passed(),
            gettext("unit(s) passed"),
            summary.failed(),
            gettext("failed")
        )?;
    }
    Ok(summary.exit_code())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    setlocale(LocaleCategory::LcAll, "");
    textdomain(PROJECT_NAME)?;
    bind_textdomain_codeset(PROJECT_NAME, "UTF-8")?;

    let args = Args::parse();

    let exit_code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("unguard: {}", e);
            1
        }
    };

    std::process::exit(exit_code)
}
