//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use std::io;
use std::path::PathBuf;

use clap::Parser;
use gettextrs::{bind_textdomain_codeset, gettext, setlocale, textdomain, LocaleCategory};
use plib::PROJECT_NAME;
use unguard::audit::{audit_tree, count_findings, write_report};
use unguard::guard::DEFAULT_GUARD;
use unguard::{profiles, Config, Guard};

/// check-unguard - report leftover guard tokens in a source tree
#[derive(Parser)]
#[command(version, about = gettext("check-unguard - report leftover guard tokens in a source tree"))]
struct Args {
    #[arg(short, long, default_value = DEFAULT_GUARD, help = gettext("Guard token to look for"))]
    guard: String,

    #[arg(short, long, default_value = "generic", help = gettext("Rule profile whose extra file extensions are scanned"))]
    profile: String,

    #[arg(short, long, conflicts_with = "quiet", help = gettext("Report the number of findings"))]
    verbose: bool,

    #[arg(short, long, help = gettext("Print nothing; report through the exit status only"))]
    quiet: bool,

    #[arg(help = gettext("Directory to scan"))]
    dir: PathBuf,
}

fn check(args: &Args) -> unguard::Result<i32> {
    let guard = Guard::new(&args.guard)?;
    let profile = profiles::find(&args.profile)?;
    let filter = Config::default().source_filter(profile.extensions);

    let report = audit_tree(&guard, &args.dir, &filter)?;

    if !args.quiet {
        write_report(&mut io::stdout(), &guard, &report)?;
        if args.verbose {
            println!(
                "{} {} {} {}",
                count_findings(&report),
                gettext("finding(s) in"),
                report.len(),
                gettext("file(s)")
            );
        }
    }

    Ok(if report.is_empty() { 0 } else { 1 })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    setlocale(LocaleCategory::LcAll, "");
    textdomain(PROJECT_NAME)?;
    bind_textdomain_codeset(PROJECT_NAME, "UTF-8")?;

    let args = Args::parse();

    if !args.dir.is_dir() {
        eprintln!("{}: {}", gettext("Invalid directory"), args.dir.display());
        std::process::exit(1);
    }

    let exit_code = match check(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("check-unguard: {}", e);
            1
        }
    };

    std::process::exit(exit_code)
}
