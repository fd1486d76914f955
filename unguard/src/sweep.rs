//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use crate::guard::Guard;

/// Delete every remaining guard-family token in place, leaving the rest of
/// each line alone. Returns the new text and the number of tokens removed.
pub fn sweep(guard: &Guard, text: &str) -> (String, usize) {
    let count = guard.any().find_iter(text).count();
    if count == 0 {
        return (text.to_string(), 0);
    }
    (guard.any().replace_all(text, "").into_owned(), count)
}
