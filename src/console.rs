//! Where builtins read from and write to.
//!
//! The CLI uses the process stdio; tests and embedders capture output into a
//! buffer and feed input from a preloaded script.
//!
//! Input is read as raw bytes up to a newline and decoded lossily, so bytes
//! that are not valid UTF-8 never abort a read.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Console implementation using enum dispatch.
pub enum Console {
    /// Process stdout/stdin.
    Stdio,
    /// In-memory output buffer with scripted input lines.
    Captured(CapturedConsole),
}

#[derive(Default)]
pub struct CapturedConsole {
    output: String,
    errors: String,
    input: VecDeque<Vec<u8>>,
}

impl CapturedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue input text; it is handed out one line at a time.
    pub fn with_input(input: &str) -> Self {
        Self::with_input_bytes(input.as_bytes())
    }

    pub fn with_input_bytes(input: &[u8]) -> Self {
        Self {
            input: input
                .split_inclusive(|&b| b == b'\n')
                .map(<[u8]>::to_vec)
                .collect(),
            ..Self::default()
        }
    }
}

impl Console {
    pub fn captured() -> Self {
        Console::Captured(CapturedConsole::new())
    }

    pub fn captured_with_input(input: &str) -> Self {
        Console::Captured(CapturedConsole::with_input(input))
    }

    pub fn captured_with_input_bytes(input: &[u8]) -> Self {
        Console::Captured(CapturedConsole::with_input_bytes(input))
    }

    pub fn print(&mut self, text: &str) -> io::Result<()> {
        match self {
            Console::Stdio => io::stdout().lock().write_all(text.as_bytes()),
            Console::Captured(c) => {
                c.output.push_str(text);
                Ok(())
            }
        }
    }

    /// Diagnostic text for stderr, such as the `panic()` report.
    pub fn eprint(&mut self, text: &str) -> io::Result<()> {
        match self {
            Console::Stdio => {
                io::stdout().flush()?;
                io::stderr().lock().write_all(text.as_bytes())
            }
            Console::Captured(c) => {
                c.errors.push_str(text);
                Ok(())
            }
        }
    }

    /// Read one line including its trailing newline, or "" at end of input.
    pub fn read_line(&mut self) -> io::Result<String> {
        let bytes = match self {
            Console::Stdio => {
                io::stdout().flush()?;
                let mut line = Vec::new();
                io::stdin().lock().read_until(b'\n', &mut line)?;
                line
            }
            Console::Captured(c) => c.input.pop_front().unwrap_or_default(),
        };
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Console::Stdio => io::stdout().flush(),
            Console::Captured(_) => Ok(()),
        }
    }

    /// Everything written so far. Always empty for `Stdio`.
    pub fn output(&self) -> &str {
        match self {
            Console::Stdio => "",
            Console::Captured(c) => &c.output,
        }
    }

    /// Everything sent to [`Console::eprint`]. Always empty for `Stdio`.
    pub fn errors(&self) -> &str {
        match self {
            Console::Stdio => "",
            Console::Captured(c) => &c.errors,
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Console::Stdio
    }
}
