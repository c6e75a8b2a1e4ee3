// src/watch/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled include/exclude glob patterns for one watch root.
///
/// Patterns are evaluated against paths relative to the root, with forward
/// slashes (e.g. `"com/acme/Foo.class"`).
#[derive(Clone)]
pub struct RootProfile {
    include_set: GlobSet,
    exclude_set: Option<GlobSet>,
}

impl fmt::Debug for RootProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootProfile")
            .field("include", &self.include_set.len())
            .field("exclude", &self.exclude_set.as_ref().map(|s| s.len()))
            .finish()
    }
}

impl RootProfile {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include_set = build_globset(include).context("building include globset")?;

        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };

        Ok(Self {
            include_set,
            exclude_set,
        })
    }

    /// Profile that accepts every path.
    pub fn everything() -> Self {
        let mut builder = GlobSetBuilder::new();
        if let Ok(glob) = Glob::new("**/*") {
            builder.add(glob);
        }
        Self {
            include_set: builder.build().unwrap_or_else(|_| GlobSet::empty()),
            exclude_set: None,
        }
    }

    /// True if a file at `rel_path` is interesting for this root.
    pub fn matches(&self, rel_path: &str) -> bool {
        self.include_set.is_match(rel_path) && !self.is_excluded(rel_path)
    }

    /// Directories are not filtered by the include list (a deleted package
    /// directory has no extension to match on), only by excludes.
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        match &self.exclude_set {
            Some(exclude) => exclude.is_match(rel_path),
            None => false,
        }
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
