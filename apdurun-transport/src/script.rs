//! Script runner.
//!
//! Reads one hex frame per line and pushes each through a [`SecureSession`],
//! strictly in order. The first error stops the run.

use std::io::{BufRead, Write};

use apdurun_core::CommandFrame;

use crate::device::Transport;
use crate::error::TransportError;
use crate::session::SecureSession;

/// Counters for a finished run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScriptSummary {
    /// Frames sent to the device.
    pub sent: usize,
    /// Lines too short to be a frame.
    pub skipped: usize,
}

/// Run every line of `input` against `session`.
///
/// When `apdu_log` is set and the session is secure, each decrypted response
/// is written to `out` as `<= Clear <hex>`.
///
/// # Errors
///
/// Stops at the first malformed line, transport failure or channel error.
/// Frames before it have already been sent.
pub fn run_script<T, R, W>(
    session: &mut SecureSession<T>,
    input: R,
    out: &mut W,
    apdu_log: bool,
) -> Result<ScriptSummary, TransportError>
where
    T: Transport,
    R: BufRead,
    W: Write,
{
    let mut summary = ScriptSummary::default();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let frame = match CommandFrame::parse_line(&line) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(line = index + 1, "skipping short line");
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::error!(line = index + 1, error = %e, "bad script line");
                return Err(e.into());
            }
        };

        let clear = session.exchange(&frame)?;
        summary.sent += 1;

        if let (true, Some(clear)) = (apdu_log, clear) {
            writeln!(out, "<= Clear {}", hex::encode(clear))?;
        }
    }

    tracing::debug!(sent = summary.sent, skipped = summary.skipped, "script finished");
    Ok(summary)
}
