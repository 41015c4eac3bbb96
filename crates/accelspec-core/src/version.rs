//! Version extraction from C headers and build-configuration scripts.
//!
//! A dependency's version may be spelled several ways depending on which
//! release is installed: `#define FREETYPE_MAJOR 2` in a header,
//! `LIBART_MAJOR_VERSION=2` in an old `configure.in`, or
//! `m4_define([libart_major_version], [2])` in a newer one. A
//! [`VersionScheme`] lists every accepted spelling; callers never need to
//! know which one a given tree uses.

use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

/// An ordered set of patterns that each yield a `(level, value)` pair.
///
/// Every pattern must define the named groups `level` and `value`. Levels
/// are matched case-insensitively against `levels`, which also fixes the
/// order in which they are joined.
#[derive(Debug)]
pub struct VersionScheme {
    levels: &'static [&'static str],
    patterns: Vec<Regex>,
}

impl VersionScheme {
    /// Build a scheme from raw patterns.
    ///
    /// # Errors
    ///
    /// Returns the regex error for the first pattern that does not compile.
    pub fn new(levels: &'static [&'static str], patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { levels, patterns })
    }

    /// Extract a dotted version from `text`.
    ///
    /// Each line is tested against the patterns in order and the first hit
    /// is used; a later line for the same level replaces an earlier one.
    /// Levels that never matched (or matched with an empty value) are
    /// dropped rather than zero-filled. Returns `default` when nothing
    /// matched at all.
    pub fn parse(&self, text: &str, default: &str) -> String {
        let mut found: Vec<Option<&str>> = vec![None; self.levels.len()];

        for line in text.lines() {
            let Some(caps) = self.patterns.iter().find_map(|p| p.captures(line)) else {
                continue;
            };
            let (Some(level), Some(value)) = (caps.name("level"), caps.name("value")) else {
                continue;
            };
            if value.as_str().is_empty() {
                continue;
            }
            if let Some(idx) = self
                .levels
                .iter()
                .position(|l| l.eq_ignore_ascii_case(level.as_str()))
            {
                found[idx] = Some(value.as_str());
            }
        }

        let parts: Vec<&str> = found.into_iter().flatten().collect();
        if parts.is_empty() {
            default.to_string()
        } else {
            parts.join(".")
        }
    }
}

/// `FREETYPE_MAJOR` / `FREETYPE_MINOR` / `FREETYPE_PATCH` in `freetype.h`.
pub static FREETYPE: LazyLock<VersionScheme> = LazyLock::new(|| {
    VersionScheme::new(
        &["major", "minor", "patch"],
        &[r"^#define\s+FREETYPE_(?P<level>MAJOR|MINOR|PATCH)\s*(?P<value>\d*)\s*$"],
    )
    .expect("static pattern")
});

/// libart's version as declared in its `configure.in`, old or new style.
pub static LIBART_CONFIGURE: LazyLock<VersionScheme> = LazyLock::new(|| {
    VersionScheme::new(
        &["major", "minor", "micro"],
        &[
            r"^\s*LIBART_(?P<level>MAJOR|MINOR|MICRO)_VERSION\s*=\s*(?P<value>\d+)",
            r"^\s*m4_define\s*\(\s*\[\s*libart_(?P<level>major|minor|micro)_version\s*\]\s*,\s*\[(?P<value>\d+)\]\s*\)",
        ],
    )
    .expect("static pattern")
});

/// Apply `scheme` to `text`, falling back to `default`.
pub fn parse_version(text: &str, scheme: &VersionScheme, default: &str) -> String {
    scheme.parse(text, default)
}

/// The string literal of `#define <name> "<value>"`, if present.
///
/// Used for the `VERSION` tag embedded in accelerator sources.
pub fn define_string(text: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"(?m)^#define\s+{}\s+"([^"]*)""#, regex::escape(name))).ok()?;
    re.captures(text).map(|c| c[1].to_string())
}

/// The last whitespace-separated token of the first `#define <name> ...`
/// line, kept verbatim (quotes included).
pub fn define_token(text: &str, name: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        if words.next() != Some("#define") || words.next() != Some(name) {
            return None;
        }
        words.last().map(str::to_string)
    })
}

/// Numeric-aware comparison of dotted version tags.
///
/// Components that parse as integers compare numerically, anything else
/// lexically; a missing component sorts before a present one.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(n), Ok(m)) => n.cmp(&m),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}
