//! Audit record rendering

/// Separator substituted for line breaks inside a record
const LINE_BREAK_SEPARATOR: &str = " | ";

/// Flatten `text` onto one line
///
/// `\r\n`, `\n` and `\r` all become [`LINE_BREAK_SEPARATOR`].
pub fn single_line(text: &str) -> String {
    text.trim_end_matches(['\r', '\n'])
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', LINE_BREAK_SEPARATOR)
}

/// Summary of one completed upload batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// Outcome tag, e.g. `loaded` or `invocation_failed`
    pub status: String,
    /// Number of distinct staged files handed to the transform job
    pub files: usize,
    pub message: String,
    /// Progress notices drained from the transform job, in arrival order
    pub notices: Vec<String>,
    /// Pre-formatted elapsed time
    pub elapsed: String,
}

impl AuditRecord {
    /// Render as a single log line (without trailing newline)
    ///
    /// `[loaded] files=2 Files uploaded ... | notices: a; b | elapsed: 00h 00m 03s`
    pub fn render(&self) -> String {
        let mut line = format!("[{}] files={} {}", self.status, self.files, self.message);

        if !self.notices.is_empty() {
            line.push_str(LINE_BREAK_SEPARATOR);
            line.push_str("notices: ");
            line.push_str(&self.notices.join("; "));
        }

        line.push_str(LINE_BREAK_SEPARATOR);
        line.push_str("elapsed: ");
        line.push_str(&self.elapsed);

        single_line(&line)
    }
}

impl std::fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
