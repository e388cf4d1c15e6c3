//! Yes/no terminal prompt
//!
//! Generic over the reader and writer so the consent flow can drive it from
//! stdin/stdout and tests can drive it from byte buffers.

use std::io::{BufRead, Write};

use tracing::debug;

use crate::constants::PROMPT_ATTEMPTS;
use crate::error::{Error, Result};

/// Ask `question` until the answer is `yes` or `no`.
///
/// Answers are trimmed and case-insensitive. Fails with
/// `Error::PromptExhausted` after `PROMPT_ATTEMPTS` unrecognised answers, or
/// as soon as the input is closed.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<bool> {
    write_prompt(output, &format!("{question} (yes/no): "))?;

    for attempt in 1..=PROMPT_ATTEMPTS {
        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .map_err(|e| Error::Io(format!("reading prompt answer: {e}")))?;
        if read == 0 {
            debug!(attempt, "prompt input closed");
            return Err(Error::PromptExhausted {
                attempts: attempt - 1,
            });
        }

        if let Some(answer) = parse_answer(&line) {
            return Ok(answer);
        }
        debug!(attempt, "unrecognised prompt answer");
        if attempt < PROMPT_ATTEMPTS {
            write_prompt(output, "Please enter 'yes' or 'no': ")?;
        }
    }

    Err(Error::PromptExhausted {
        attempts: PROMPT_ATTEMPTS,
    })
}

/// `Some(true)` for yes, `Some(false)` for no, `None` for anything else.
pub fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

fn write_prompt<W: Write>(output: &mut W, text: &str) -> Result<()> {
    output
        .write_all(text.as_bytes())
        .and_then(|_| output.flush())
        .map_err(|e| Error::Io(format!("writing prompt: {e}")))
}
