//! Confirmation providers
//!
//! The driver asks for approval through [`ConfirmCallback`] so it does not
//! depend on a terminal. The binary supplies an interactive prompt; tests
//! and `--force` use the canned implementations here.

use crate::error::{Error, Result};
use std::io::{BufRead, Write};

/// Confirmation callback for user interaction
pub trait ConfirmCallback {
    /// Ask the user to confirm an action
    ///
    /// # Arguments
    /// * `prompt` - The prompt to show before reading a response
    ///
    /// # Returns
    /// `true` if the user typed `yes`, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Reads one line from `input` after writing the prompt to `output`.
///
/// Only `yes` (trimmed, any case) approves.
pub struct LineConfirm<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LineConfirm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> ConfirmCallback for LineConfirm<R, W> {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        write!(self.output, "{prompt}: ")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "no response to confirmation prompt",
            )));
        }
        Ok(is_yes(&line))
    }
}

/// Whether a typed response approves the action.
pub fn is_yes(response: &str) -> bool {
    response.trim().eq_ignore_ascii_case("yes")
}
