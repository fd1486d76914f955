//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The sentinel macro family whose conditional blocks get resolved.

use regex::Regex;

use crate::error::{Error, Result};

/// Guard token used when none is configured.
pub const DEFAULT_GUARD: &str = "SPEC";

/// A guard token together with the patterns derived from it.
///
/// The family of a guard `G` is `G` itself plus every identifier
/// `G_[A-Z0-9_]+`.
#[derive(Debug, Clone)]
pub struct Guard {
    token: String,
    any: Regex,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

impl Guard {
    pub fn new(token: &str) -> Result<Self> {
        if !is_identifier(token) {
            return Err(Error::InvalidGuard(token.to_string()));
        }
        let tok = regex::escape(token);
        Ok(Guard {
            token: token.to_string(),
            any: Regex::new(&format!(r"\b{tok}(?:_[A-Z0-9_]+)?\b"))?,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Whole-word occurrences of the token or a member of its family.
    pub fn any(&self) -> &Regex {
        &self.any
    }

    /// True if `ident` is the token or a member of its family.
    pub fn is_member(&self, ident: &str) -> bool {
        if ident == self.token {
            return true;
        }
        match ident.strip_prefix(self.token.as_str()) {
            Some(rest) => {
                rest.len() > 1
                    && rest.starts_with('_')
                    && rest[1..]
                        .chars()
                        .all(|c| c == '_' || c.is_ascii_uppercase() || c.is_ascii_digit())
            }
            None => false,
        }
    }

    pub fn mentions(&self, text: &str) -> bool {
        self.any.is_match(text)
    }

    /// Substitute `{GUARD}` and `{guard}` in a pattern template with the
    /// regex-escaped token, as given and in lower case.
    pub fn expand(&self, template: &str) -> String {
        template
            .replace("{GUARD}", &regex::escape(&self.token))
            .replace("{guard}", &regex::escape(&self.token.to_lowercase()))
    }

    /// Like [`Guard::expand`], for file names and other literal text.
    pub fn name(&self, template: &str) -> String {
        template
            .replace("{GUARD}", &self.token)
            .replace("{guard}", &self.token.to_lowercase())
    }
}
