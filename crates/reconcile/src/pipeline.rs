//! Remote execution pipeline
//!
//! A chain of commands run over one transport. After each command the
//! success callback inspects the output and decides whether the chain
//! goes on ([`Flow::Continue`]) or halts quietly ([`Flow::Stop`]). A failed
//! command or callback halts the chain with an error. Every later `run`
//! is then a no-op.
//!
//! ```ignore
//! Pipeline::new(&mut transport)
//!     .run("docker service ls ...", |out| {
//!         Ok(if out.is_empty() { Flow::Stop } else { Flow::Continue })
//!     })
//!     .run("docker service inspect ...", |out| { /* ... */ Ok(Flow::Continue) })
//!     .on_error(skip_reset)
//!     .finish()?;
//! ```
//!
//! `on_error` sees both kinds of halt and may recover the pipeline. A
//! recovered pipeline reports no error but stays halted: `run` does not
//! resume after recovery.

use crate::error::{Error, Result};
use crate::transport::Transport;
use std::fmt;

/// Decision returned by a step's success callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Skip the remaining steps without failing
    Stop,
}

/// Why a pipeline stopped running steps.
#[derive(Debug)]
pub enum Halt {
    /// A callback asked to stop early
    Stopped,
    /// A command or callback failed
    Failed(Error),
}

/// How a pipeline ended, when it did not end in error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every step ran
    Finished,
    /// A step stopped the chain and nothing recovered it
    Stopped,
    /// An error handler absorbed the halt
    Recovered,
}

#[derive(Debug)]
enum State {
    Ready,
    Halted(Halt),
    Recovered,
}

/// Sequential command runner with a stop channel.
pub struct Pipeline<'a> {
    transport: &'a mut dyn Transport,
    state: State,
}

impl<'a> Pipeline<'a> {
    pub fn new(transport: &'a mut dyn Transport) -> Self {
        Self {
            transport,
            state: State::Ready,
        }
    }

    /// Run `command` and hand its stdout to `on_success`.
    ///
    /// Does nothing unless every previous step continued.
    pub fn run<C, F>(self, command: C, on_success: F) -> Self
    where
        C: fmt::Display,
        F: FnOnce(&str) -> Result<Flow>,
    {
        self.step(command, None, on_success)
    }

    /// [`Pipeline::run`] with `input` written to the command's stdin.
    pub fn run_with_input<C, F>(self, command: C, input: &[u8], on_success: F) -> Self
    where
        C: fmt::Display,
        F: FnOnce(&str) -> Result<Flow>,
    {
        self.step(command, Some(input), on_success)
    }

    fn step<C, F>(mut self, command: C, input: Option<&[u8]>, on_success: F) -> Self
    where
        C: fmt::Display,
        F: FnOnce(&str) -> Result<Flow>,
    {
        if !matches!(self.state, State::Ready) {
            log::trace!("pipeline halted, skipping: {command}");
            return self;
        }

        let command = command.to_string();
        log::debug!("running: {command}");
        let output = match input {
            Some(input) => self.transport.exec_with_input(&command, input),
            None => self.transport.exec(&command),
        };
        let outcome = output.and_then(|output| {
            log::trace!("output of '{command}':\n{output}");
            on_success(&output)
        });

        match outcome {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => {
                log::debug!("pipeline stopped after: {command}");
                self.state = State::Halted(Halt::Stopped);
            }
            Err(err) => {
                log::debug!("pipeline failed at '{command}': {err}");
                self.state = State::Halted(Halt::Failed(err));
            }
        }
        self
    }

    /// Give a halted pipeline to `handler`.
    ///
    /// `Ok(())` recovers the pipeline, `Err` replaces its error. A pipeline
    /// that has not halted, or was already recovered, is left as is.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Halt) -> Result<()>,
    {
        self.state = match std::mem::replace(&mut self.state, State::Recovered) {
            State::Halted(halt) => match handler(halt) {
                Ok(()) => State::Recovered,
                Err(err) => State::Halted(Halt::Failed(err)),
            },
            other => other,
        };
        self
    }

    /// The error that halted the pipeline, if any.
    ///
    /// A quiet stop is not an error.
    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            State::Halted(Halt::Failed(err)) => Some(err),
            _ => None,
        }
    }

    /// Whether later steps will be skipped.
    pub fn is_halted(&self) -> bool {
        !matches!(self.state, State::Ready)
    }

    /// Consume the pipeline, surfacing an unrecovered error.
    pub fn finish(self) -> Result<Completion> {
        match self.state {
            State::Ready => Ok(Completion::Finished),
            State::Recovered => Ok(Completion::Recovered),
            State::Halted(Halt::Stopped) => Ok(Completion::Stopped),
            State::Halted(Halt::Failed(err)) => Err(err),
        }
    }
}

/// Error handler that absorbs a quiet stop and passes failures through.
pub fn skip_reset(halt: Halt) -> Result<()> {
    match halt {
        Halt::Stopped => Ok(()),
        Halt::Failed(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn test_runs_all_steps() {
        let mut mock = MockTransport::new().respond("a").respond("b");
        let mut seen = Vec::new();
        let completion = Pipeline::new(&mut mock)
            .run("first", |out| {
                seen.push(out.to_string());
                Ok(Flow::Continue)
            })
            .run("second", |out| {
                seen.push(out.to_string());
                Ok(Flow::Continue)
            })
            .finish()
            .unwrap();
        assert_eq!(completion, Completion::Finished);
        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(mock.commands(), ["first", "second"]);
    }

    #[test]
    fn test_run_with_input_sends_stdin() {
        let mut mock = MockTransport::new();
        Pipeline::new(&mut mock)
            .run_with_input("cat", b"secret", |_| Ok(Flow::Continue))
            .run("after", |_| Ok(Flow::Continue))
            .finish()
            .unwrap();
        assert_eq!(mock.inputs(), ["secret"]);
        assert_eq!(mock.commands(), ["cat", "after"]);
    }

    #[test]
    fn test_failure_skips_remaining_steps() {
        let mut mock = MockTransport::new().fail_on("first");
        let mut called = false;
        let pipeline = Pipeline::new(&mut mock)
            .run("first", |_| Ok(Flow::Continue))
            .run("second", |_| {
                called = true;
                Ok(Flow::Continue)
            });
        assert!(pipeline.is_halted());
        assert!(matches!(
            pipeline.error(),
            Some(Error::CommandFailed { command, .. }) if command == "first"
        ));
        assert!(pipeline.finish().is_err());
        assert!(!called);
        assert_eq!(mock.commands(), ["first"]);
    }

    #[test]
    fn test_callback_error_halts() {
        let mut mock = MockTransport::new();
        let err = Pipeline::new(&mut mock)
            .run("first", |_| Err(Error::Other("bad output".into())))
            .run("second", |_| Ok(Flow::Continue))
            .finish()
            .unwrap_err();
        assert_eq!(err.to_string(), "bad output");
        assert_eq!(mock.commands().len(), 1);
    }

    #[test]
    fn test_stop_is_not_an_error() {
        let mut mock = MockTransport::new();
        let pipeline = Pipeline::new(&mut mock)
            .run("first", |_| Ok(Flow::Stop))
            .run("second", |_| Ok(Flow::Continue));
        assert!(pipeline.error().is_none());
        assert!(pipeline.is_halted());
        assert_eq!(pipeline.finish().unwrap(), Completion::Stopped);
        assert_eq!(mock.commands(), ["first"]);
    }

    #[test]
    fn test_skip_reset_recovers_stop() {
        let mut mock = MockTransport::new();
        let completion = Pipeline::new(&mut mock)
            .run("first", |_| Ok(Flow::Stop))
            .on_error(skip_reset)
            .finish()
            .unwrap();
        assert_eq!(completion, Completion::Recovered);
    }

    #[test]
    fn test_skip_reset_keeps_failure() {
        let mut mock = MockTransport::new().fail_on("first");
        let pipeline = Pipeline::new(&mut mock)
            .run("first", |_| Ok(Flow::Continue))
            .on_error(skip_reset);
        assert!(pipeline.error().is_some());
    }

    #[test]
    fn test_on_error_not_called_when_ok() {
        let mut mock = MockTransport::new();
        let mut called = false;
        let completion = Pipeline::new(&mut mock)
            .run("first", |_| Ok(Flow::Continue))
            .on_error(|_| {
                called = true;
                Ok(())
            })
            .finish()
            .unwrap();
        assert!(!called);
        assert_eq!(completion, Completion::Finished);
    }

    #[test]
    fn test_handler_can_replace_error() {
        let mut mock = MockTransport::new().fail_on("first");
        let err = Pipeline::new(&mut mock)
            .run("first", |_| Ok(Flow::Continue))
            .on_error(|_| Err(Error::Other("annotated".into())))
            .finish()
            .unwrap_err();
        assert_eq!(err.to_string(), "annotated");
    }

    #[test]
    fn test_recovered_pipeline_stays_halted() {
        let mut mock = MockTransport::new().fail_on("first");
        let pipeline = Pipeline::new(&mut mock)
            .run("first", |_| Ok(Flow::Continue))
            .on_error(|_| Ok(()))
            .run("second", |_| Ok(Flow::Continue));
        assert!(pipeline.error().is_none());
        assert!(pipeline.is_halted());
        assert_eq!(pipeline.finish().unwrap(), Completion::Recovered);
        assert_eq!(mock.commands(), ["first"]);
    }
}
