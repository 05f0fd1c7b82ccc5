//! Operator interaction.
//!
//! The workflow only talks to the operator through [`Operator`], so tests can
//! script answers without a terminal.

use dialoguer::{theme::ColorfulTheme, Input, Select};

use crate::disk::ExternalDisk;
use crate::error::{Error, Result};

/// Word the operator must type to approve a destructive action.
pub const CONFIRM_WORD: &str = "YES";

pub trait Operator {
    /// Pick one of `disks`; `None` when the operator backs out.
    fn select_disk(&mut self, disks: &[ExternalDisk]) -> Result<Option<usize>>;

    /// Ask for typed confirmation. Only the exact confirmation word approves.
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Interactive prompts on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalOperator;

impl Operator for TerminalOperator {
    fn select_disk(&mut self, disks: &[ExternalDisk]) -> Result<Option<usize>> {
        let theme = ColorfulTheme::default();
        let items: Vec<String> = disks.iter().map(ToString::to_string).collect();
        Select::with_theme(&theme)
            .with_prompt("Select the target disk (Esc to cancel)")
            .items(&items)
            .default(0)
            .interact_opt()
            .map_err(prompt_error)
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        let theme = ColorfulTheme::default();
        let answer: String = Input::with_theme(&theme)
            .with_prompt(format!("{} Type {} to continue", prompt, CONFIRM_WORD))
            .allow_empty(true)
            .interact_text()
            .map_err(prompt_error)?;
        Ok(is_confirmation(&answer))
    }
}

/// Exact, case-sensitive match; surrounding whitespace is ignored.
pub fn is_confirmation(answer: &str) -> bool {
    answer.trim() == CONFIRM_WORD
}

fn prompt_error(err: dialoguer::Error) -> Error {
    match err {
        dialoguer::Error::IO(e) if e.kind() == std::io::ErrorKind::Interrupted => {
            Error::Interrupted
        }
        other => Error::Prompt(other.to_string()),
    }
}
