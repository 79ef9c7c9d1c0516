use std::fmt;

/// A position in the source text. Lines and columns start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub location: Location,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[line {}] {}: {}", self.location, label, self.message)
    }
}

/// Collects diagnostics from every front-end pass. Nothing is printed until
/// the caller asks for it, so a whole pass can finish before reporting.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, location: Location, message: impl Into<String>) {
        self.errors += 1;
        self.push(location, Severity::Error, message.into());
    }

    pub fn warning(&mut self, location: Location, message: impl Into<String>) {
        self.warnings += 1;
        self.push(location, Severity::Warning, message.into());
    }

    fn push(&mut self, location: Location, severity: Severity, message: String) {
        tracing::debug!(%location, ?severity, %message, "diagnostic");
        self.diagnostics.push(Diagnostic { location, severity, message });
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_severity() {
        let mut sink = DiagnosticSink::new();
        sink.error(Location::new(1, 1), "first");
        sink.warning(Location::new(2, 4), "second");
        sink.error(Location::new(3, 2), "third");

        assert_eq!(sink.error_count(), 2);
        assert_eq!(sink.warning_count(), 1);
        assert!(sink.has_errors());
        assert_eq!(sink.iter().count(), 3);
    }

    #[test]
    fn display_includes_position() {
        let mut sink = DiagnosticSink::new();
        sink.error(Location::new(7, 3), "duplicate local 'x'");
        let text = sink.iter().next().map(|d| d.to_string()).unwrap();
        assert_eq!(text, "[line 7:3] error: duplicate local 'x'");
    }
}
