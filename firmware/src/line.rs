//! UART line framing for the command console.
//!
//! Bytes are assembled into request lines terminated by CR or LF, with
//! backspace editing. Replies are rendered into fixed-capacity buffers with a
//! CRLF terminator so the writer task never allocates.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::Write;
use core::str;

use heapless::{String, Vec};
use stim_core::command::Reply;
use stim_core::command::grammar::MAX_LINE_LEN;

/// Room for the longest `STATUS` reply plus CRLF.
pub const REPLY_CAPACITY: usize = 80;

pub type ReplyLine = String<REPLY_CAPACITY>;

/// Reasons an assembled line was discarded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineError {
    /// More than [`MAX_LINE_LEN`] bytes arrived before the terminator.
    Overflow,
    InvalidUtf8,
}

/// Byte-at-a-time line assembler.
pub struct LineAssembler {
    buffer: Vec<u8, MAX_LINE_LEN>,
    overflowed: bool,
    complete: bool,
}

impl LineAssembler {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
            complete: false,
        }
    }

    /// Feeds one byte. Returns a finished line when `byte` terminates one.
    ///
    /// The returned line stays valid until the next call.
    pub fn push(&mut self, byte: u8) -> Option<Result<&str, LineError>> {
        if self.complete {
            self.buffer.clear();
            self.complete = false;
        }

        match byte {
            b'\r' | b'\n' => self.finish(),
            0x08 | 0x7f => {
                if !self.overflowed {
                    self.buffer.pop();
                }
                None
            }
            value => {
                if !self.overflowed && self.buffer.push(value).is_err() {
                    self.overflowed = true;
                }
                None
            }
        }
    }

    /// True while bytes of an unterminated line are buffered.
    pub fn has_partial(&self) -> bool {
        self.overflowed || (!self.complete && !self.buffer.is_empty())
    }

    /// Drops any partial line.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
        self.complete = false;
    }

    fn finish(&mut self) -> Option<Result<&str, LineError>> {
        if self.overflowed {
            self.reset();
            return Some(Err(LineError::Overflow));
        }
        if self.buffer.is_empty() {
            return None;
        }

        self.complete = true;
        Some(str::from_utf8(&self.buffer).map_err(|_| LineError::InvalidUtf8))
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders `reply` followed by CRLF.
pub fn render_reply(reply: &Reply) -> ReplyLine {
    let mut line = ReplyLine::new();
    if write!(line, "{reply}\r\n").is_err() {
        line.clear();
        let _ = write!(line, "{}\r\n", Reply::Unparsable);
    }
    line
}
