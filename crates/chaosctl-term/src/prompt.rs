//! Interactive terminal prompter

use crate::report::render_plan;
use chaosctl_core::{PlanSummary, PromptField, Prompter, ProvisionError};
use dialoguer::console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};

/// Prompts on the controlling terminal using dialoguer
pub struct TermPrompter {
    theme: ColorfulTheme,
}

impl TermPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TermPrompter {
    fn default() -> Self {
        Self::new()
    }
}

fn prompt_error(err: dialoguer::Error) -> ProvisionError {
    ProvisionError::Prompt(err.to_string())
}

impl Prompter for TermPrompter {
    fn input(
        &mut self,
        field: PromptField,
        prompt: &str,
        default: &str,
    ) -> Result<String, ProvisionError> {
        tracing::debug!(field = field.label(), "Prompting");
        let mut input = Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true);
        if !default.is_empty() {
            input = input.default(default.to_string());
        }
        input.interact_text().map_err(prompt_error)
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool, ProvisionError> {
        Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(prompt_error)
    }

    fn select(
        &mut self,
        field: PromptField,
        prompt: &str,
        items: &[&str],
        default: usize,
    ) -> Result<usize, ProvisionError> {
        tracing::debug!(field = field.label(), "Prompting selection");
        Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact()
            .map_err(prompt_error)
    }

    fn review(&mut self, summary: &PlanSummary) -> Result<bool, ProvisionError> {
        println!();
        println!("{}", style("The following chaos infrastructure will be connected").bold());
        print!("{}", render_plan(summary));
        println!();
        self.confirm("Proceed?", true)
    }

    fn warn(&mut self, message: &str) {
        eprintln!("{} {}", style("!").yellow().bold(), style(message).yellow());
    }

    fn info(&mut self, message: &str) {
        println!("{}", style(message).dim());
    }

    fn is_interactive(&self) -> bool {
        true
    }
}
