//! Addons option parsing
//!
//! One addon source per line, space separated:
//!
//! ```text
//! local <dir> [key=value ...]
//! <vcs> <url> <dir> <revision> [key=value ...]
//! ```
//!
//! Parsing stops at the first blank line; anything after it is ignored.

use crate::core::error::{Result, SourceError};
use crate::core::output;
use crate::spec::{AddonOptions, SourceDescriptor, SourceEntry};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Parse the `addons` option into addon directories and their sources.
///
/// A directory declared twice keeps its first position but takes the last
/// declaration.
pub fn parse_addons(
    text: &str,
    vcs_kinds: &BTreeSet<String>,
) -> Result<IndexMap<PathBuf, SourceEntry>> {
    let mut addons = IndexMap::new();

    for line in text.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&kind) = tokens.first() else {
            break;
        };

        let spec_len = if kind == "local" { 2 } else { 4 };
        if tokens.len() < spec_len {
            return Err(SourceError::malformed(
                line,
                &tokens,
                if kind == "local" {
                    "expecting local <dir>"
                } else {
                    "expecting <vcs> <url> <dir> <revision>"
                },
            ));
        }

        let (dir, descriptor) = if kind == "local" {
            (tokens[1], SourceDescriptor::Local)
        } else {
            if !vcs_kinds.contains(kind) {
                return Err(SourceError::UnsupportedVcs(kind.to_string()));
            }
            (
                tokens[2],
                SourceDescriptor::Vcs {
                    kind: kind.to_string(),
                    url: tokens[1].to_string(),
                    revision: tokens[3].to_string(),
                },
            )
        };

        let mut options = AddonOptions::new();
        for opt in &tokens[spec_len..] {
            let (key, value) = opt.split_once('=').ok_or_else(|| {
                SourceError::malformed(line, &tokens, format!("option {opt:?} is not key=value"))
            })?;
            options.insert(key, value);
        }

        let entry = SourceEntry {
            descriptor,
            options,
        };
        if addons.insert(PathBuf::from(dir), entry).is_some() {
            output::warning(&format!(
                "addons directory {dir} declared more than once, the last declaration wins"
            ));
        }
    }

    Ok(addons)
}
