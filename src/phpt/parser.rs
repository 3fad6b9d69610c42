//! Directive-header test files
//!
//! ```text
//! @kphp_should_warn k2_skip
//! /Undefined array key/
//! <?php
//! ...
//! ```
//!
//! The first non-empty line names the expected outcome and optional tags,
//! `/.../` lines until `<?php` are regexes the diagnostics must match.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum PhptError {
    IoError(std::io::Error),
    MissingSection(String),
    InvalidFormat(String),
}

impl From<std::io::Error> for PhptError {
    fn from(err: std::io::Error) -> Self {
        PhptError::IoError(err)
    }
}

impl std::fmt::Display for PhptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhptError::IoError(e) => write!(f, "IO error: {}", e),
            PhptError::MissingSection(s) => write!(f, "Missing required section: {}", s),
            PhptError::InvalidFormat(s) => write!(f, "Invalid format: {}", s),
        }
    }
}

impl std::error::Error for PhptError {}

/// One token of the header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `@ok`: runs and matches PHP output
    Ok,
    /// `@kphp_should_fail`: compilation must be refused
    ShouldFail,
    /// `@kphp_should_warn`: compiles with a warning
    ShouldWarn,
    /// `@wa`: known wrong answer
    WrongAnswer,
    /// `@kphp_vs_php_diff`: documented divergence from PHP
    VsPhpDiff,
    /// Anything else (`k2_skip`, `no_php`, `benchmark`, `php8`, ...)
    Tag(String),
}

impl Directive {
    pub fn parse(token: &str) -> Directive {
        match token {
            "@ok" => Directive::Ok,
            "@kphp_should_fail" => Directive::ShouldFail,
            "@kphp_should_warn" => Directive::ShouldWarn,
            "@wa" => Directive::WrongAnswer,
            "@kphp_vs_php_diff" => Directive::VsPhpDiff,
            other => Directive::Tag(other.trim_start_matches('@').to_string()),
        }
    }

    fn outcome(&self) -> Option<Expectation> {
        match self {
            Directive::Ok => Some(Expectation::Ok),
            Directive::ShouldFail => Some(Expectation::CompileFail),
            Directive::ShouldWarn => Some(Expectation::Warn),
            Directive::WrongAnswer => Some(Expectation::WrongAnswer),
            Directive::VsPhpDiff => Some(Expectation::Divergent),
            Directive::Tag(_) => None,
        }
    }
}

/// What a conforming runner should observe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    Ok,
    CompileFail,
    Warn,
    WrongAnswer,
    Divergent,
}

impl Expectation {
    /// Documented PHP/engine difference rather than a bug
    pub fn is_divergent(self) -> bool {
        matches!(self, Expectation::Divergent | Expectation::WrongAnswer)
    }
}

#[derive(Debug, Clone)]
pub struct PhptTest {
    pub file_path: PathBuf,
    pub directives: Vec<Directive>,
    /// Regex sources from `/.../` header lines, delimiters stripped
    pub expected_diagnostics: Vec<String>,
    /// Everything from `<?php` on
    pub source: String,
}

impl PhptTest {
    pub fn from_file(path: &Path) -> Result<Self, PhptError> {
        let bytes = fs::read(path)?;
        let content = String::from_utf8_lossy(&bytes);
        Self::from_string(&content, path.to_path_buf())
    }

    pub fn from_string(content: &str, file_path: PathBuf) -> Result<Self, PhptError> {
        let mut lines = content.lines();
        let header = lines
            .by_ref()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| PhptError::MissingSection("directive".to_string()))?;
        if !header.starts_with('@') {
            return Err(PhptError::InvalidFormat(format!(
                "expected a directive line, found {:?}",
                header
            )));
        }
        let directives: Vec<Directive> = header.split_whitespace().map(Directive::parse).collect();
        if !directives.iter().any(|d| d.outcome().is_some()) {
            return Err(PhptError::InvalidFormat(format!(
                "no outcome directive in {:?}",
                header
            )));
        }

        let mut expected_diagnostics = Vec::new();
        let mut found_source = false;
        let mut consumed = Vec::new();
        for line in lines.by_ref() {
            let trimmed = line.trim();
            if trimmed.starts_with("<?php") {
                consumed.push(line);
                found_source = true;
                break;
            }
            if trimmed.len() >= 2 && trimmed.starts_with('/') && trimmed.ends_with('/') {
                expected_diagnostics.push(trimmed[1..trimmed.len() - 1].to_string());
            }
        }
        if !found_source {
            return Err(PhptError::MissingSection("<?php".to_string()));
        }
        consumed.extend(lines);

        Ok(PhptTest {
            file_path,
            directives,
            expected_diagnostics,
            source: consumed.join("\n"),
        })
    }

    /// The first outcome directive on the header line
    pub fn expectation(&self) -> Expectation {
        self.directives
            .iter()
            .find_map(Directive::outcome)
            .unwrap_or(Expectation::Ok)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.directives
            .iter()
            .any(|d| matches!(d, Directive::Tag(t) if t == tag))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Tag(t) => Some(t.as_str()),
            _ => None,
        })
    }

    /// Divergent outcome, or a test PHP itself must not run (`no_php`)
    pub fn is_divergent(&self) -> bool {
        self.expectation().is_divergent() || self.has_tag("no_php")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let content = "@ok\n<?php\necho 1;\n";
        let test = PhptTest::from_string(content, PathBuf::from("a.php")).unwrap();
        assert_eq!(test.expectation(), Expectation::Ok);
        assert_eq!(test.source, "<?php\necho 1;");
        assert!(!test.is_divergent());
    }

    #[test]
    fn test_parse_tags_and_diagnostics() {
        let content = "\n@kphp_should_fail k2_skip\n/Couldn't reify generic/\n/breaks condition/\n<?php\nf();\n";
        let test = PhptTest::from_string(content, PathBuf::from("b.php")).unwrap();
        assert_eq!(test.expectation(), Expectation::CompileFail);
        assert!(test.has_tag("k2_skip"));
        assert_eq!(
            test.expected_diagnostics,
            vec!["Couldn't reify generic".to_string(), "breaks condition".to_string()]
        );
    }

    #[test]
    fn test_divergence_markers() {
        let diff = PhptTest::from_string("@kphp_vs_php_diff\n<?php\n", PathBuf::new()).unwrap();
        assert!(diff.is_divergent());
        let no_php = PhptTest::from_string("@ok no_php\n<?php\n", PathBuf::new()).unwrap();
        assert_eq!(no_php.expectation(), Expectation::Ok);
        assert!(no_php.is_divergent());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            PhptTest::from_string("<?php\n", PathBuf::new()),
            Err(PhptError::InvalidFormat(_))
        ));
        assert!(matches!(
            PhptTest::from_string("@ok\necho 1;\n", PathBuf::new()),
            Err(PhptError::MissingSection(_))
        ));
        assert!(matches!(
            PhptTest::from_string("@benchmark\n<?php\n", PathBuf::new()),
            Err(PhptError::InvalidFormat(_))
        ));
        assert!(matches!(
            PhptTest::from_string("", PathBuf::new()),
            Err(PhptError::MissingSection(_))
        ));
    }
}
