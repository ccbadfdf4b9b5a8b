//! Module containing terminal utilities

use std::io::{self, BufRead, Write};

use crate::{FlashutilsError, FlashutilsResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Determines if stdin is attached to a terminal.
pub fn is_interactive_terminal() -> bool {
    let stdin_is_tty = unsafe { libc::isatty(libc::STDIN_FILENO) == 1 };

    if stdin_is_tty && std::env::var("TERM").is_err() {
        tracing::debug!("detected TTY without TERM environment variable");
    }

    stdin_is_tty
}

/// Writes `prompt` to `output` and reads one line of answer from `input`.
///
/// Only an answer starting with `y` counts as a yes. An empty answer or end of input is a no.
pub fn ask_yes_no<R, W>(prompt: &str, input: &mut R, output: &mut W) -> FlashutilsResult<bool>
where
    R: BufRead,
    W: Write,
{
    writeln!(output, "{prompt}").map_err(FlashutilsError::Prompt)?;
    output.flush().map_err(FlashutilsError::Prompt)?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .map_err(FlashutilsError::Prompt)?;

    Ok(answer.trim_start().starts_with('y'))
}

/// Asks the question on stderr and reads the answer from stdin.
pub fn ask_stdin(prompt: &str) -> FlashutilsResult<bool> {
    if !is_interactive_terminal() {
        tracing::debug!("stdin is not a terminal, reading confirmation anyway");
    }

    let stdin = io::stdin();
    ask_yes_no(prompt, &mut stdin.lock(), &mut io::stderr())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
