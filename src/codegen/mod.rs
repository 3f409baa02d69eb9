//! Line-oriented code buffer for emitted model code
//!
//! A [`CodeGenerator`] is owned by a single conversion call. It supports
//! ordered line appends, indent/dedent scoping for nested blocks, and
//! retraction of a previously appended line by exact text match (used to
//! drop a fixed-variance declaration once the weight normalizer finds it
//! redundant).

use std::fmt;

const INDENT_STEP: usize = 4;

#[derive(Debug, Default, Clone)]
pub struct CodeGenerator {
    lines: Vec<String>,
    indent: usize,
}

impl CodeGenerator {
    pub fn new() -> Self {
        CodeGenerator::default()
    }

    /// Append one line at the current indentation level
    pub fn add(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if line.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{}", " ".repeat(self.indent), line));
        }
    }

    pub fn empty_line(&mut self) {
        self.lines.push(String::new());
    }

    pub fn indent(&mut self) {
        self.indent += INDENT_STEP;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(INDENT_STEP);
    }

    /// Remove the most recently appended line whose text (ignoring
    /// indentation) equals `line`. Returns whether a line was removed.
    pub fn remove(&mut self, line: &str) -> bool {
        if let Some(position) = self.lines.iter().rposition(|l| l.trim() == line.trim()) {
            self.lines.remove(position);
            true
        } else {
            false
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The assembled code
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for CodeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indentation_scoping() {
        let mut cg = CodeGenerator::new();
        cg.add("if (BLQ == 1) {");
        cg.indent();
        cg.add("Y <- F");
        cg.dedent();
        cg.add("}");
        assert_eq!(cg.render(), "if (BLQ == 1) {\n    Y <- F\n}");
    }

    #[test]
    fn remove_matches_exact_text() {
        let mut cg = CodeGenerator::new();
        cg.add("SIGMA1 <- fixed(1)");
        cg.add("Y <- F");
        assert!(cg.remove("SIGMA1 <- fixed(1)"));
        assert!(!cg.remove("SIGMA1 <- fixed(1)"));
        assert_eq!(cg.render(), "Y <- F");
    }

    #[test]
    fn remove_takes_most_recent_occurrence() {
        let mut cg = CodeGenerator::new();
        cg.add("W <- 1");
        cg.add("Y <- F");
        cg.add("W <- 1");
        assert!(cg.remove("W <- 1"));
        assert_eq!(cg.lines(), &["W <- 1".to_string(), "Y <- F".to_string()]);
    }
}
