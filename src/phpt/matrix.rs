//! Compatibility matrix over a scanned test corpus

use crate::phpt::parser::{Expectation, PhptError, PhptTest};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Ok,
    CompileFail,
    Warn,
    WrongAnswer,
    Divergent,
    /// The header could not be parsed
    Invalid,
}

impl OutcomeClass {
    pub fn label(self) -> &'static str {
        match self {
            OutcomeClass::Ok => "ok",
            OutcomeClass::CompileFail => "compile_fail",
            OutcomeClass::Warn => "warn",
            OutcomeClass::WrongAnswer => "wrong_answer",
            OutcomeClass::Divergent => "divergent",
            OutcomeClass::Invalid => "invalid",
        }
    }
}

impl From<Expectation> for OutcomeClass {
    fn from(expectation: Expectation) -> Self {
        match expectation {
            Expectation::Ok => OutcomeClass::Ok,
            Expectation::CompileFail => OutcomeClass::CompileFail,
            Expectation::Warn => OutcomeClass::Warn,
            Expectation::WrongAnswer => OutcomeClass::WrongAnswer,
            Expectation::Divergent => OutcomeClass::Divergent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidFile {
    pub file: PathBuf,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct CompatMatrix {
    pub total: usize,
    pub counts: BTreeMap<OutcomeClass, usize>,
    pub tags: BTreeMap<String, usize>,
    /// Files whose behavior is a documented PHP/engine difference
    pub divergent: Vec<PathBuf>,
    pub invalid: Vec<InvalidFile>,
}

impl CompatMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, test: &PhptTest) {
        self.total += 1;
        *self
            .counts
            .entry(OutcomeClass::from(test.expectation()))
            .or_insert(0) += 1;
        for tag in test.tags() {
            *self.tags.entry(tag.to_string()).or_insert(0) += 1;
        }
        if test.is_divergent() {
            self.divergent.push(test.file_path.clone());
        }
    }

    pub fn add_error(&mut self, file: &Path, error: &PhptError) {
        self.total += 1;
        *self.counts.entry(OutcomeClass::Invalid).or_insert(0) += 1;
        self.invalid.push(InvalidFile {
            file: file.to_path_buf(),
            error: error.to_string(),
        });
    }

    /// Parse and record one file
    pub fn scan_file(&mut self, file: &Path) {
        match PhptTest::from_file(file) {
            Ok(test) => self.add(&test),
            Err(e) => self.add_error(file, &e),
        }
    }

    pub fn count(&self, class: OutcomeClass) -> usize {
        self.counts.get(&class).copied().unwrap_or(0)
    }

    pub fn render_text(&self, list_divergent: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Compatibility matrix");
        let _ = writeln!(out, "{}", "=".repeat(40));
        for (class, count) in &self.counts {
            let _ = writeln!(out, "  {:<14} {}", class.label(), count);
        }
        let _ = writeln!(out, "  {:<14} {}", "total", self.total);
        if !self.tags.is_empty() {
            let _ = writeln!(out, "Tags:");
            for (tag, count) in &self.tags {
                let _ = writeln!(out, "  {:<14} {}", tag, count);
            }
        }
        if list_divergent && !self.divergent.is_empty() {
            let _ = writeln!(out, "Divergent:");
            for file in &self.divergent {
                let _ = writeln!(out, "  {}", file.display());
            }
        }
        for invalid in &self.invalid {
            let _ = writeln!(out, "✗ {}: {}", invalid.file.display(), invalid.error);
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
