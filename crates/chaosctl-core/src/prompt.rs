//! Interactive I/O seam
//!
//! The engine never touches the terminal directly. Interactive runs use a
//! terminal prompter, headless runs answer from flags, tests use a script.

use crate::error::ProvisionError;
use crate::types::PlanSummary;

/// Which value a prompt is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptField {
    ProjectId,
    InfraName,
    Namespace,
    ServiceAccount,
    Platform,
}

impl PromptField {
    pub fn label(&self) -> &'static str {
        match self {
            PromptField::ProjectId => "project id",
            PromptField::InfraName => "chaos infrastructure name",
            PromptField::Namespace => "namespace",
            PromptField::ServiceAccount => "service account",
            PromptField::Platform => "platform",
        }
    }
}

/// Line-based user interaction
pub trait Prompter {
    /// Read a line; blank input yields `default`
    fn input(
        &mut self,
        field: PromptField,
        prompt: &str,
        default: &str,
    ) -> Result<String, ProvisionError>;

    /// Yes/no question
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool, ProvisionError>;

    /// Pick one of `items`, returning its index
    fn select(
        &mut self,
        field: PromptField,
        prompt: &str,
        items: &[&str],
        default: usize,
    ) -> Result<usize, ProvisionError>;

    /// Show the negotiated plan and ask whether to go ahead
    fn review(&mut self, summary: &PlanSummary) -> Result<bool, ProvisionError>;

    /// Recoverable problem, the next prompt follows
    fn warn(&mut self, message: &str);

    /// Progress information
    fn info(&mut self, message: &str);

    /// Whether a human is answering
    fn is_interactive(&self) -> bool;
}

/// Attempt counter for re-prompt loops
///
/// `cap = None` loops for as long as the user keeps answering.
#[derive(Debug, Clone)]
pub struct Attempts {
    what: &'static str,
    used: u32,
    cap: Option<u32>,
}

impl Attempts {
    pub fn new(what: &'static str, cap: Option<u32>) -> Self {
        Self { what, used: 0, cap }
    }

    /// Claim the next attempt, failing once the cap is reached
    pub fn next(&mut self) -> Result<u32, ProvisionError> {
        if let Some(cap) = self.cap
            && self.used >= cap
        {
            return Err(ProvisionError::ExhaustedRetries {
                what: self.what,
                attempts: self.used,
            });
        }
        self.used += 1;
        Ok(self.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_cap() {
        let mut attempts = Attempts::new("namespace", Some(2));
        assert_eq!(attempts.next().unwrap(), 1);
        assert_eq!(attempts.next().unwrap(), 2);
        match attempts.next() {
            Err(ProvisionError::ExhaustedRetries { what, attempts }) => {
                assert_eq!(what, "namespace");
                assert_eq!(attempts, 2);
            }
            other => panic!("expected ExhaustedRetries, got {:?}", other),
        }
    }

    #[test]
    fn test_attempts_unbounded() {
        let mut attempts = Attempts::new("name", None);
        for _ in 0..1000 {
            attempts.next().unwrap();
        }
        assert_eq!(attempts.next().unwrap(), 1001);
    }

    #[test]
    fn test_zero_cap_fails_immediately() {
        let mut attempts = Attempts::new("name", Some(0));
        assert!(attempts.next().is_err());
    }
}
