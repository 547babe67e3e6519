//! Terminal Prompter
//!
//! [`Prompter`] backed by `dialoguer` on the controlling terminal.

use crate::domain::ports::Prompter;
use crate::error::{Error, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password};

/// Interactive prompts on stdin/stderr
pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

fn prompt_error(e: dialoguer::Error) -> Error {
    Error::Prompt(e.to_string())
}

impl Prompter for TerminalPrompter {
    fn note(&mut self, message: &str) {
        eprintln!("{}", message);
    }

    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::with_theme(&self.theme).with_prompt(question);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input.interact_text().map_err(prompt_error)
    }

    fn ask_secret(&mut self, question: &str) -> Result<String> {
        Password::with_theme(&self.theme)
            .with_prompt(question)
            .with_confirmation("Repeat", "Entries do not match")
            .interact()
            .map_err(prompt_error)
    }

    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        Confirm::with_theme(&self.theme)
            .with_prompt(question)
            .default(default)
            .interact()
            .map_err(prompt_error)
    }
}
