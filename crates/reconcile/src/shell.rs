//! Shell command builder
//!
//! Commands are sent to the remote host as a single string and interpreted
//! by its shell, so every flag value and positional argument is quoted on
//! its own. Values made only of safe characters are left bare to keep
//! logged commands readable.

use std::fmt;

/// Quote `value` for a POSIX shell if it contains anything unsafe.
pub fn quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    let safe = |ch: char| ch.is_ascii_alphanumeric() || "_@%+=:,./-".contains(ch);
    if value.chars().all(safe) {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push_str("'\"'\"'");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// Quote each word and join with spaces.
pub fn join(words: &[String]) -> String {
    words
        .iter()
        .map(|word| quote(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A long flag, optionally with a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellFlag {
    /// Whether the flag is emitted at all
    pub check: bool,
    pub name: String,
    pub value: String,
    /// Emit `--name ''` for an empty value instead of a bare `--name`
    pub allow_empty: bool,
}

impl ShellFlag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            check: true,
            name: name.into(),
            value: value.into(),
            allow_empty: false,
        }
    }
}

impl fmt::Display for ShellFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.check || self.name.is_empty() {
            return Ok(());
        }
        if self.value.is_empty() && !self.allow_empty {
            write!(f, "--{}", self.name)
        } else {
            write!(f, "--{} {}", self.name, quote(&self.value))
        }
    }
}

/// A positional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellArg {
    pub check: bool,
    pub value: String,
}

impl fmt::Display for ShellArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.check || self.value.is_empty() {
            return Ok(());
        }
        f.write_str(&quote(&self.value))
    }
}

/// A command name followed by flags and positional arguments.
///
/// The name is emitted verbatim and may hold several words, e.g.
/// `docker service create`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellCommand {
    pub name: String,
    pub flags: Vec<ShellFlag>,
    pub args: Vec<ShellArg>,
}

impl ShellCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// `--name value`
    pub fn flag(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_flag(ShellFlag::new(name, value))
    }

    /// `--name value` when `check` holds.
    pub fn flag_if(self, check: bool, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_flag(ShellFlag {
            check,
            ..ShellFlag::new(name, value)
        })
    }

    /// `--name value`, or `--name ''` when the value is empty.
    pub fn flag_allow_empty(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_flag(ShellFlag {
            allow_empty: true,
            ..ShellFlag::new(name, value)
        })
    }

    /// Bare `--name`.
    pub fn switch(self, name: impl Into<String>) -> Self {
        self.flag(name, "")
    }

    /// Bare `--name` when `check` holds.
    pub fn switch_if(self, check: bool, name: impl Into<String>) -> Self {
        self.flag_if(check, name, "")
    }

    /// One `--name value` per element.
    pub fn flag_each<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self = self.flag(name, value);
        }
        self
    }

    pub fn push_flag(mut self, flag: ShellFlag) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn arg(self, value: impl Into<String>) -> Self {
        self.arg_if(true, value)
    }

    pub fn arg_if(mut self, check: bool, value: impl Into<String>) -> Self {
        self.args.push(ShellArg {
            check,
            value: value.into(),
        });
        self
    }

    /// Values of every emitted flag called `name`, unquoted.
    pub fn flag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.flags
            .iter()
            .filter(move |flag| flag.check && flag.name == name)
            .map(|flag| flag.value.as_str())
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flag_values(name).next().is_some()
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = std::iter::once(self.name.clone())
            .chain(self.flags.iter().map(ToString::to_string))
            .chain(self.args.iter().map(ToString::to_string))
            .filter(|part| !part.is_empty());
        let mut first = true;
        for part in parts {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(&part)?;
            first = false;
        }
        Ok(())
    }
}
