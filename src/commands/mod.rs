pub mod filter;
pub mod group;
pub mod index;
pub mod map;
pub mod status;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

#[cfg(test)]
mod tests {
    use super::CommandReport;

    #[test]
    fn issues_flip_ok() {
        let mut report = CommandReport::new("status");
        report.detail("records=5");
        assert!(report.ok);

        report.issue("dangling parent links: 2");
        assert!(!report.ok);
        assert_eq!(report.details, vec!["records=5"]);
        assert_eq!(report.issues.len(), 1);
    }
}
