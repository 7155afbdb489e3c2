//! `CMD;ARGS` request grammar.
//!
//! A request is a keyword, optionally followed by `;` and an argument. Table
//! commands take a comma separated list of decimal or `0x` hexadecimal values.
//! The whole request may be framed as `>...<`; keywords are case-insensitive.
//!
//! ```text
//! SF;20            set frequency (Hz)
//! SW;5             set pulse width (100 µs units)
//! SC;0x0101,0x0202 set channel patterns
//! SA;200,450       set amplitude codes
//! SON | SOFF       start | stop
//! STATUS | HELP
//! ```

use core::fmt;

use heapless::Vec;
use winnow::ascii::{Caseless, dec_uint, hex_uint, space0};
use winnow::combinator::{alt, opt, preceded};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::config::defaults::MAX_PULSES;

/// Maximum number of bytes accepted on a single request line.
pub const MAX_LINE_LEN: usize = 96;

pub const FRAME_START: char = '>';
pub const FRAME_END: char = '<';

/// Values supplied to a table command.
pub type TableValues = Vec<u16, MAX_PULSES>;

/// Command keywords.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandTag {
    Frequency,
    PulseWidth,
    ChannelPatterns,
    Amplitudes,
    Start,
    Stop,
    Status,
    Help,
}

impl CommandTag {
    pub const ALL: [CommandTag; 8] = [
        CommandTag::Frequency,
        CommandTag::PulseWidth,
        CommandTag::ChannelPatterns,
        CommandTag::Amplitudes,
        CommandTag::Start,
        CommandTag::Stop,
        CommandTag::Status,
        CommandTag::Help,
    ];

    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            CommandTag::Frequency => "SF",
            CommandTag::PulseWidth => "SW",
            CommandTag::ChannelPatterns => "SC",
            CommandTag::Amplitudes => "SA",
            CommandTag::Start => "SON",
            CommandTag::Stop => "SOFF",
            CommandTag::Status => "STATUS",
            CommandTag::Help => "HELP",
        }
    }

    /// Case-insensitive keyword lookup.
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.keyword().eq_ignore_ascii_case(keyword))
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Parsed request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    SetFrequency(u32),
    SetPulseWidth(u32),
    SetChannelPatterns(TableValues),
    SetAmplitudes(TableValues),
    Start,
    Stop,
    Status,
    Help,
}

impl Command {
    #[must_use]
    pub fn tag(&self) -> CommandTag {
        match self {
            Command::SetFrequency(_) => CommandTag::Frequency,
            Command::SetPulseWidth(_) => CommandTag::PulseWidth,
            Command::SetChannelPatterns(_) => CommandTag::ChannelPatterns,
            Command::SetAmplitudes(_) => CommandTag::Amplitudes,
            Command::Start => CommandTag::Start,
            Command::Stop => CommandTag::Stop,
            Command::Status => CommandTag::Status,
            Command::Help => CommandTag::Help,
        }
    }
}

/// Reasons a request line was not understood.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseError<'a> {
    Empty,
    UnknownCommand(&'a str),
    MissingArgument(CommandTag),
    InvalidNumber { tag: CommandTag, text: &'a str },
    TooManyValues(CommandTag),
    TrailingInput(&'a str),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty request"),
            ParseError::UnknownCommand(text) => write!(f, "unknown command `{text}`"),
            ParseError::MissingArgument(tag) => write!(f, "{tag} expects `;` and a value"),
            ParseError::InvalidNumber { tag, text } => {
                write!(f, "{tag}: `{text}` is not a valid number")
            }
            ParseError::TooManyValues(tag) => {
                write!(f, "{tag} accepts at most {MAX_PULSES} values")
            }
            ParseError::TrailingInput(text) => write!(f, "unexpected trailing input `{text}`"),
        }
    }
}

/// Parses one request line (without its terminator).
pub fn parse(line: &str) -> Result<Command, ParseError<'_>> {
    let body = unframe(line);
    if body.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut input = body;
    let word = keyword
        .parse_next(&mut input)
        .map_err(|_| ParseError::UnknownCommand(body))?;
    let tag = CommandTag::from_keyword(word).ok_or(ParseError::UnknownCommand(word))?;

    let command = match tag {
        CommandTag::Frequency => Command::SetFrequency(scalar_argument(tag, &mut input)?),
        CommandTag::PulseWidth => Command::SetPulseWidth(scalar_argument(tag, &mut input)?),
        CommandTag::ChannelPatterns => {
            Command::SetChannelPatterns(table_argument(tag, &mut input)?)
        }
        CommandTag::Amplitudes => Command::SetAmplitudes(table_argument(tag, &mut input)?),
        CommandTag::Start => Command::Start,
        CommandTag::Stop => Command::Stop,
        CommandTag::Status => Command::Status,
        CommandTag::Help => Command::Help,
    };

    let rest = input.trim();
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(ParseError::TrailingInput(rest))
    }
}

/// Strips surrounding whitespace and the optional `>...<` frame.
#[must_use]
pub fn unframe(line: &str) -> &str {
    let line = line.trim();
    let line = line.strip_prefix(FRAME_START).unwrap_or(line);
    let line = line.strip_suffix(FRAME_END).unwrap_or(line);
    line.trim()
}

fn keyword<'a>(input: &mut &'a str) -> winnow::Result<&'a str> {
    take_while(1.., |c: char| c.is_ascii_alphabetic()).parse_next(input)
}

fn argument_separator(input: &mut &str) -> winnow::Result<()> {
    (space0, ';', space0).void().parse_next(input)
}

fn list_separator(input: &mut &str) -> winnow::Result<()> {
    (space0, ',', space0).void().parse_next(input)
}

fn table_value(input: &mut &str) -> winnow::Result<u16> {
    alt((preceded(Caseless("0x"), hex_uint), dec_uint)).parse_next(input)
}

fn scalar_argument<'a>(tag: CommandTag, input: &mut &'a str) -> Result<u32, ParseError<'a>> {
    argument_separator
        .parse_next(input)
        .map_err(|_| ParseError::MissingArgument(tag))?;
    if input.trim().is_empty() {
        return Err(ParseError::MissingArgument(tag));
    }

    let start = *input;
    dec_uint::<_, u32, winnow::error::ContextError>
        .parse_next(input)
        .map_err(|_| ParseError::InvalidNumber {
            tag,
            text: leading_token(start),
        })
}

fn table_argument<'a>(tag: CommandTag, input: &mut &'a str) -> Result<TableValues, ParseError<'a>> {
    argument_separator
        .parse_next(input)
        .map_err(|_| ParseError::MissingArgument(tag))?;
    if input.trim().is_empty() {
        return Err(ParseError::MissingArgument(tag));
    }

    let mut values = TableValues::new();
    loop {
        let start = *input;
        let value = table_value
            .parse_next(input)
            .map_err(|_| ParseError::InvalidNumber {
                tag,
                text: leading_token(start),
            })?;
        values
            .push(value)
            .map_err(|_| ParseError::TooManyValues(tag))?;

        match opt(list_separator).parse_next(input) {
            Ok(Some(())) => {}
            Ok(None) | Err(_) => break,
        }
    }

    Ok(values)
}

fn leading_token(input: &str) -> &str {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .next()
        .unwrap_or_default()
}
