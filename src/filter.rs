//! Filename filters compiled from glob patterns.
//!
//! A pattern is one or more comma/semicolon-separated globs (`*.jpg;*.png`)
//! OR'd together. Dotfile and backup-file exclusion happen on the basename
//! before any pattern matching and short-circuit to a non-match.

use crate::error::{VfsError, VfsResult};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Option flags applied before pattern matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterFlags {
    /// Match case-insensitively.
    pub case_insensitive: bool,
    /// Reject basenames starting with `.`.
    pub exclude_dotfiles: bool,
    /// Reject basenames ending with `~`.
    pub exclude_backup: bool,
}

/// A compiled filename predicate.
#[derive(Debug)]
pub struct Filter {
    pattern: Option<String>,
    flags: FilterFlags,
    regexps: Vec<Regex>,
}

impl Filter {
    /// Compile `pattern` with `flags`. An empty or `*` pattern means
    /// "no filtering": every name passes (the flag exclusions still
    /// apply).
    pub fn new(pattern: &str, flags: FilterFlags) -> VfsResult<Self> {
        let effective = if pattern.is_empty() || pattern == "*" {
            None
        } else {
            Some(pattern.to_string())
        };

        let mut regexps = Vec::new();
        if let Some(ref pattern) = effective {
            for sub in pattern.split([',', ';']) {
                let sub = sub.trim();
                if sub.is_empty() {
                    continue;
                }
                let regex = RegexBuilder::new(&glob_to_regex(sub))
                    .case_insensitive(flags.case_insensitive)
                    .build()
                    .map_err(|e| {
                        VfsError::InvalidFilename(format!("bad pattern {sub:?}: {e}"))
                    })?;
                regexps.push(regex);
            }
        }

        Ok(Filter {
            pattern: effective,
            flags,
            regexps,
        })
    }

    /// A filter that passes everything, with no flag exclusions.
    pub fn pass_all() -> Self {
        Filter {
            pattern: None,
            flags: FilterFlags::default(),
            regexps: Vec::new(),
        }
    }

    /// True when the pattern applies no narrowing (flags may still).
    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
    }

    /// Test a path. Only the basename is consulted.
    pub fn matches(&self, name: &Path) -> bool {
        let Some(base) = name.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };

        if self.flags.exclude_dotfiles && base.starts_with('.') {
            return false;
        }
        if self.flags.exclude_backup && base.ends_with('~') {
            return false;
        }
        if self.pattern.is_none() {
            return true;
        }
        self.regexps.iter().any(|re| re.is_match(&base))
    }
}

/// Translate one glob into an anchored regex: `*` → `.*`, `?` → `.`,
/// everything else escaped literally.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}
