//! chaosctl-term: terminal front end for chaosctl
//!
//! Prompter implementations for interactive and headless runs, and the
//! text reports printed around a provisioning run.

pub mod headless;
pub mod prompt;
pub mod report;

pub use headless::HeadlessPrompter;
pub use prompt::TermPrompter;
pub use report::{hint, render_failure, render_outcome, render_plan, render_report};
