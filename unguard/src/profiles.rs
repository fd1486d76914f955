//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Per-benchmark rule profiles.

use crate::error::{Error, Result};
use crate::guard::Guard;
use crate::rules::{ActionSpec, RuleClass, RuleSet, RuleSpec, Scope, BUILTIN_RULES};

/// Extra rules and file handling for one family of source trees. Names
/// may use the `{guard}` and `{GUARD}` placeholders.
#[derive(Debug)]
pub struct Profile {
    pub name: &'static str,
    pub description: &'static str,
    /// Run before the built-in table.
    pub rules: &'static [RuleSpec],
    /// Built-in rules switched on by this profile.
    pub enable: &'static [&'static str],
    /// Files deleted from every target tree.
    pub drop_files: &'static [&'static str],
    pub renames: &'static [(&'static str, &'static str)],
    /// Source extensions added to the configured set.
    pub extensions: &'static [&'static str],
}

impl Profile {
    /// The effective rewrite table: profile rules, then the built-ins.
    pub fn rule_set(&self, guard: &Guard) -> Result<RuleSet> {
        RuleSet::compile(self.rules.iter().chain(BUILTIN_RULES.iter()), guard)?.enable(self.enable)
    }
}

pub fn find(name: &str) -> Result<&'static Profile> {
    PROFILES
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| Error::UnknownProfile(name.to_string()))
}

const LBM_TIMING: &str = "

void MAIN_startClock( MAIN_Time* time ) {
\ttime->timeScale = 1.0 / sysconf( _SC_CLK_TCK );
\ttime->tickStart = times( &(time->timeStart) );
}


/*############################################################################*/

void MAIN_stopClock( MAIN_Time* time, const MAIN_Param* param ) {
\ttime->tickStop = times( &(time->timeStop) );

\tprintf( \"MAIN_stopClock:\\n\"
\t        \"\\tusr: %7.2f sys: %7.2f tot: %7.2f wct: %7.2f MLUPS: %5.2f\\n\\n\",
\t        (time->timeStop.tms_utime - time->timeStart.tms_utime) * time->timeScale,
\t        (time->timeStop.tms_stime - time->timeStart.tms_stime) * time->timeScale,
\t        (time->timeStop.tms_utime - time->timeStart.tms_utime +
\t         time->timeStop.tms_stime - time->timeStart.tms_stime) * time->timeScale,
\t        (time->tickStop           - time->tickStart          ) * time->timeScale,
\t        1.0e-6 * SIZE_X * SIZE_Y * SIZE_Z * param->nTimeSteps /
\t        (time->tickStop           - time->tickStart          ) / time->timeScale );
}
";

pub static PROFILES: &[Profile] = &[
    Profile {
        name: "generic",
        description: "Built-in rules only",
        rules: &[],
        enable: &[],
        drop_files: &[],
        renames: &[],
        extensions: &[],
    },
    Profile {
        name: "mcf",
        description: "Minimum cost flow solver",
        rules: &[
            RuleSpec {
                name: "mcf-banner",
                description: "Drop the guard from the startup banner",
                class: RuleClass::ConstantReplacement,
                scope: Scope::SingleLine,
                enabled: true,
                until_stable: false,
                files: &["mcf.c"],
                action: ActionSpec::Replace {
                    pattern: r#"printf\([ \t]*"\\nMCF {GUARD} CPU version"#,
                    replacement: r#"printf( "\nMCF version"#,
                },
            },
            RuleSpec {
                name: "mcf-at-zero",
                description: "Re-enable AT_ZERO",
                class: RuleClass::ConstantReplacement,
                scope: Scope::MultiLine,
                enabled: true,
                until_stable: false,
                files: &[],
                action: ActionSpec::Replace {
                    pattern: r"/\* #define AT_ZERO\s+3\s+NOT ALLOWED FOR THE {GUARD} VERSION \*/\s*\n#undef AT_ZERO",
                    replacement: "#define AT_ZERO 3",
                },
            },
            RuleSpec {
                name: "mcf-time-include",
                description: "Include <time.h> for the timing report",
                class: RuleClass::StructuralRestoration,
                scope: Scope::SingleLine,
                enabled: true,
                until_stable: false,
                files: &["mcf.c"],
                action: ActionSpec::Restore {
                    marker: "#include <time.h>",
                    anchor: Some(r#"^#include[ \t]+"mcf\.h"[^\n]*\n"#),
                    text: "#include <time.h>\n",
                },
            },
        ],
        enable: &["prid64-format"],
        drop_files: &["{guard}_qsort.c", "{guard}_qsort.h", "inttypes.h"],
        renames: &[],
        extensions: &[],
    },
    Profile {
        name: "lbm",
        description: "Lattice Boltzmann fluid solver",
        rules: &[
            RuleSpec {
                name: "lbm-scanf-precision",
                description: "Read single precision velocity fields",
                class: RuleClass::TokenSubstitution,
                scope: Scope::SingleLine,
                enabled: true,
                until_stable: false,
                files: &["lbm.c"],
                action: ActionSpec::Replace {
                    pattern: r#""%lf %lf %lf\\n""#,
                    replacement: r#""%f %f %f\n""#,
                },
            },
            RuleSpec {
                name: "lbm-timing",
                description: "Restore the MAIN_startClock/MAIN_stopClock bodies",
                class: RuleClass::StructuralRestoration,
                scope: Scope::SingleLine,
                enabled: true,
                until_stable: false,
                files: &["main.c"],
                action: ActionSpec::Restore {
                    marker: "void MAIN_stopClock( MAIN_Time* time, const MAIN_Param* param ) {",
                    anchor: None,
                    text: LBM_TIMING,
                },
            },
        ],
        enable: &[],
        drop_files: &[],
        renames: &[],
        extensions: &[],
    },
    Profile {
        name: "deepsjeng",
        description: "Chess engine",
        rules: &[
            RuleSpec {
                name: "deepsjeng-max-cpu",
                description: "Single search thread",
                class: RuleClass::ConstantReplacement,
                scope: Scope::SingleLine,
                enabled: true,
                until_stable: false,
                files: &[],
                action: ActionSpec::Replace {
                    pattern: r"(#[ \t]*define[ \t]+MAX_CPU[ \t]+)\d+",
                    replacement: "${1}1",
                },
            },
            RuleSpec {
                name: "deepsjeng-cpu-arrays",
                description: "Size per-thread tables for one thread",
                class: RuleClass::TokenSubstitution,
                scope: Scope::SingleLine,
                enabled: true,
                until_stable: false,
                files: &[],
                action: ActionSpec::Replace {
                    pattern: r"\[MAX_CPU\]",
                    replacement: "[1]",
                },
            },
            RuleSpec {
                name: "deepsjeng-memory",
                description: "Pick a default hash size instead of requiring SMALL_MEMORY or BIG_MEMORY",
                class: RuleClass::DirectiveElimination,
                scope: Scope::MultiLine,
                enabled: true,
                until_stable: false,
                files: &[],
                action: ActionSpec::Replace {
                    pattern: r"#ifdef SMALL_MEMORY\s*\n.*?\n#elif BIG_MEMORY\s*\n.*?\n#else\s*\n#error Need to specify SMALL_MEMORY or BIG_MEMORY\.\s*\n#endif",
                    replacement: "TTSize = 15000000; // Default hash size",
                },
            },
            RuleSpec {
                name: "deepsjeng-copyprotection",
                description: "Keep the body of the copy protection guard",
                class: RuleClass::DirectiveElimination,
                scope: Scope::MultiLine,
                enabled: true,
                until_stable: false,
                files: &[],
                action: ActionSpec::Replace {
                    pattern: r"#if !defined COPYPROTECTION[ \t]*\n(.*?)\n#endif[^\n]*",
                    replacement: "${1}",
                },
            },
        ],
        enable: &[],
        drop_files: &[],
        renames: &[],
        extensions: &[],
    },
    Profile {
        name: "namd",
        description: "Molecular dynamics",
        rules: &[],
        enable: &[],
        drop_files: &[],
        renames: &[("{guard}_namd.C", "main.C")],
        extensions: &["C"],
    },
];
