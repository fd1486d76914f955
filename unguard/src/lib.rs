//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Resolution of guard-token conditional blocks in C/C++ source trees.
//!
//! The [`engine::Engine`] rewrites one file at a time: it resolves the
//! conditional blocks keyed on the guard token, applies the rewrite table
//! of the selected profile, and sweeps whatever guard tokens remain. The
//! [`batch::Batch`] driver applies the engine to whole source trees, and
//! the [`audit`] module checks the result independently.

pub mod audit;
pub mod batch;
pub mod builder;
pub mod config;
pub mod directive;
pub mod engine;
pub mod error;
pub mod guard;
pub mod policy;
pub mod profiles;
pub mod rules;
pub mod scanner;
pub mod sweep;
pub mod tree;

pub use config::Config;
pub use engine::{Engine, FileReport, Processed};
pub use error::{Error, Result};
pub use guard::Guard;
