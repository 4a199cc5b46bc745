//! Command transports
//!
//! A [`Transport`] runs one shell command line on the target machine and
//! returns its stdout. The binary provides SSH and local implementations.
//! [`MockTransport`] records commands and replays canned output for tests
//! and dry runs.

use crate::error::{Error, Result};
use std::collections::VecDeque;

/// Runs shell command lines against one machine.
pub trait Transport {
    /// Run `command` to completion and return its captured stdout.
    ///
    /// A non-zero exit is an [`Error::CommandFailed`].
    fn exec(&mut self, command: &str) -> Result<String>;

    /// Like [`Transport::exec`], with `input` written to the command's stdin.
    ///
    /// Keeps secrets such as registry passwords off the command line.
    fn exec_with_input(&mut self, command: &str, input: &[u8]) -> Result<String> {
        let _ = input;
        Err(Error::CommandFailed {
            command: command.to_string(),
            message: "this transport cannot send input".to_string(),
        })
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn exec(&mut self, command: &str) -> Result<String> {
        (**self).exec(command)
    }

    fn exec_with_input(&mut self, command: &str, input: &[u8]) -> Result<String> {
        (**self).exec_with_input(command, input)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn exec(&mut self, command: &str) -> Result<String> {
        (**self).exec(command)
    }

    fn exec_with_input(&mut self, command: &str, input: &[u8]) -> Result<String> {
        (**self).exec_with_input(command, input)
    }
}

/// Scripted transport that records every command it is given.
///
/// Responses are matched by command prefix first, then taken from the
/// queue in order, then fall back to the default response.
#[derive(Debug, Default)]
pub struct MockTransport {
    commands: Vec<String>,
    queued: VecDeque<String>,
    by_prefix: Vec<(String, String)>,
    failures: Vec<String>,
    default_response: String,
    inputs: Vec<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output returned when nothing more specific matches.
    pub fn with_default(mut self, output: impl Into<String>) -> Self {
        self.default_response = output.into();
        self
    }

    /// Queue output for the next unmatched command.
    pub fn respond(mut self, output: impl Into<String>) -> Self {
        self.queued.push_back(output.into());
        self
    }

    /// Return `output` for every command starting with `prefix`.
    pub fn respond_to(mut self, prefix: impl Into<String>, output: impl Into<String>) -> Self {
        self.by_prefix.push((prefix.into(), output.into()));
        self
    }

    /// Fail every command starting with `prefix`.
    pub fn fail_on(mut self, prefix: impl Into<String>) -> Self {
        self.failures.push(prefix.into());
        self
    }

    /// Commands received so far, in order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Stdin sent with [`Transport::exec_with_input`], in order.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Whether any received command starts with `prefix`.
    pub fn ran(&self, prefix: &str) -> bool {
        self.commands.iter().any(|command| command.starts_with(prefix))
    }
}

impl Transport for MockTransport {
    fn exec(&mut self, command: &str) -> Result<String> {
        self.commands.push(command.to_string());

        if self.failures.iter().any(|prefix| command.starts_with(prefix)) {
            return Err(Error::CommandFailed {
                command: command.to_string(),
                message: "exit status 1".to_string(),
            });
        }
        if let Some((_, output)) = self
            .by_prefix
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix))
        {
            return Ok(output.clone());
        }
        Ok(self
            .queued
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone()))
    }

    fn exec_with_input(&mut self, command: &str, input: &[u8]) -> Result<String> {
        self.inputs.push(String::from_utf8_lossy(input).into_owned());
        self.exec(command)
    }
}
