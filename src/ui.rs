use colored::Colorize;
use dialoguer::Input;
use reconcile::{ConfirmCallback, LineConfirm, is_yes};
use std::io::{self, Write};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

// ============================================================================
// Tables
// ============================================================================

/// Left-aligned columns separated by two spaces.
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render(headers.to_vec())];
    lines.extend(
        rows.iter()
            .map(|row| render(row.iter().map(String::as_str).collect())),
    );
    lines.join("\n")
}

// ============================================================================
// Diff colouring
// ============================================================================

/// Writer that colours diff lines by their status glyph.
///
/// Lines are buffered until a newline so each is coloured as a whole.
pub struct DiffColors<W: Write> {
    inner: W,
    pending: Vec<u8>,
}

impl<W: Write> DiffColors<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pending: Vec::new(),
        }
    }

    fn emit(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.inner, "{}", colorize_line(line))
    }
}

/// Colour one line of driver output.
pub fn colorize_line(line: &str) -> String {
    if line.starts_with(" + ") {
        line.green().to_string()
    } else if line.starts_with(" - ") {
        line.red().to_string()
    } else if line.starts_with(" ~ ") {
        line.yellow().to_string()
    } else if line.starts_with("Skiff ") || line.starts_with("Current state of ") {
        line.bold().to_string()
    } else {
        line.to_string()
    }
}

impl<W: Write> Write for DiffColors<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            self.emit(&text)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            write!(self.inner, "{text}")?;
        }
        self.inner.flush()
    }
}

// ============================================================================
// Confirmation
// ============================================================================

/// Interactive `yes` prompt.
///
/// Uses a dialoguer input on a terminal and falls back to reading a line
/// from stdin when piped.
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> reconcile::Result<bool> {
        if console::user_attended() {
            let response = Input::<String>::new()
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
                .map_err(|err| reconcile::Error::Io(io::Error::other(err)))?;
            Ok(is_yes(&response))
        } else {
            LineConfirm::new(io::stdin().lock(), io::stdout()).confirm(prompt)
        }
    }
}
