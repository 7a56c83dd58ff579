//! Non-interactive prompter
//!
//! Answers every prompt from values given on the command line. A taken
//! agent name is retried as `<name>-2`, `<name>-3` and so on; every other
//! re-prompt gets the same answer again, so the attempt cap ends the run.

use crate::report::render_plan;
use chaosctl_core::{PlanSummary, PromptField, Prompter, ProvisionError};
use dialoguer::console::style;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct HeadlessPrompter {
    presets: HashMap<PromptField, String>,
    assume_yes: bool,
    name_retries: u32,
}

impl HeadlessPrompter {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            ..Default::default()
        }
    }

    /// Answer for `field`; blank values are ignored
    pub fn preset(mut self, field: PromptField, value: Option<&str>) -> Self {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.presets.insert(field, value.to_string());
        }
        self
    }

    fn next_name(&mut self) -> String {
        let Some(base) = self.presets.get(&PromptField::InfraName) else {
            return String::new();
        };
        self.name_retries += 1;
        format!("{}-{}", base, self.name_retries + 1)
    }
}

impl Prompter for HeadlessPrompter {
    fn input(
        &mut self,
        field: PromptField,
        _prompt: &str,
        default: &str,
    ) -> Result<String, ProvisionError> {
        let answer = match field {
            // Asked only after the given name collided
            PromptField::InfraName => self.next_name(),
            _ => self
                .presets
                .get(&field)
                .cloned()
                .unwrap_or_else(|| default.to_string()),
        };
        tracing::debug!(field = field.label(), answer = %answer, "Headless answer");
        Ok(answer)
    }

    fn confirm(&mut self, _prompt: &str, _default: bool) -> Result<bool, ProvisionError> {
        Ok(self.assume_yes)
    }

    fn select(
        &mut self,
        field: PromptField,
        _prompt: &str,
        items: &[&str],
        default: usize,
    ) -> Result<usize, ProvisionError> {
        let chosen = self
            .presets
            .get(&field)
            .and_then(|v| items.iter().position(|i| i.eq_ignore_ascii_case(v)));
        Ok(chosen.unwrap_or(default))
    }

    fn review(&mut self, summary: &PlanSummary) -> Result<bool, ProvisionError> {
        print!("{}", render_plan(summary));
        if !self.assume_yes {
            self.warn("Refusing to continue without confirmation, pass --yes");
        }
        Ok(self.assume_yes)
    }

    fn warn(&mut self, message: &str) {
        eprintln!("{} {}", style("warning:").yellow().bold(), message);
    }

    fn info(&mut self, message: &str) {
        println!("{}", message);
    }

    fn is_interactive(&self) -> bool {
        false
    }
}
