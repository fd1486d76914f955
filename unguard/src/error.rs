//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error processing io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid guard token {0:?}: must be a C identifier")]
    InvalidGuard(String),
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("unknown rewrite rule {0:?}")]
    UnknownRule(String),
    #[error("unknown profile {0:?}")]
    UnknownProfile(String),
    #[error("invalid rewrite rule {name:?}: {reason}")]
    InvalidRule { name: String, reason: String },
    #[error("missing input: {}", .0.display())]
    MissingInput(PathBuf),
    #[error("no processing units found under {}", .0.display())]
    NoUnits(PathBuf),
    #[error("build failed: {0}")]
    Build(String),
}

pub type Result<T> = std::result::Result<T, Error>;
