//! Structured run log.
//!
//! Every decision the resolver makes is recorded here and also emitted as a
//! `tracing` event as it happens, so the caller can both watch progress and
//! print a summary once the run is over.

use std::fmt;

/// Severity of an [`InfoLine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoLevel {
    Info,
    Warn,
}

impl InfoLevel {
    fn prefix(self) -> &'static str {
        match self {
            Self::Info => "#####",
            Self::Warn => "!!!!!",
        }
    }
}

/// One recorded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoLine {
    pub level: InfoLevel,
    pub message: String,
}

/// Ordered record of a resolution run.
#[derive(Debug, Clone, Default)]
pub struct InfoLog {
    tag: String,
    lines: Vec<InfoLine>,
}

impl InfoLog {
    /// A log whose rendered lines carry `tag` (e.g. `accelspec-linux-x86_64`).
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            lines: Vec::new(),
        }
    }

    /// Record an informational line.
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.lines.push(InfoLine {
            level: InfoLevel::Info,
            message,
        });
    }

    /// Record a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.lines.push(InfoLine {
            level: InfoLevel::Warn,
            message,
        });
    }

    /// Recorded lines, oldest first.
    pub fn lines(&self) -> &[InfoLine] {
        &self.lines
    }

    /// True if `needle` occurs in any recorded message.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.message.contains(needle))
    }

    /// Lines rendered as `##### <tag>: <message>`.
    pub fn rendered(&self) -> Vec<String> {
        self.lines
            .iter()
            .map(|l| format!("{} {}: {}", l.level.prefix(), self.tag, l.message))
            .collect()
    }
}

impl fmt::Display for InfoLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.rendered() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
