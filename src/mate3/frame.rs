use crate::prelude::*;

use nom::{
    bytes::complete::{take_till, take_while_m_n},
    character::complete::char,
    sequence::{delimited, separated_pair},
    IResult,
};
use serde::Serialize;
use std::net::IpAddr;

// ControllerId {{{
/// Identity of one physical MATE3: the 12 hex digits of its header with the
/// hyphen removed, or the sender address for headerless datagrams.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ControllerId(String);

impl ControllerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for ControllerId {
    fn from(addr: IpAddr) -> Self {
        Self(addr.to_string())
    }
}

impl FromStr for ControllerId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(crate::file_error!("{} is not a 12 hex digit controller id", s));
        }

        Ok(Self(hex.to_ascii_uppercase()))
    }
}

impl std::fmt::Display for ControllerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for ControllerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
} // }}}

/// One datagram split into its controller identity and raw device records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub controller: ControllerId,
    pub records: Vec<String>,
    /// Text that was not a closed `<...>` record, such as the tail of a
    /// truncated datagram. Never decoded.
    pub malformed: Vec<String>,
}

fn hex6(input: &str) -> IResult<&str, &str> {
    take_while_m_n(6, 6, |c: char| c.is_ascii_hexdigit())(input)
}

// [XXXXXX-XXXXXX]
fn header(input: &str) -> IResult<&str, ControllerId> {
    let (rest, (high, low)) =
        delimited(char('['), separated_pair(hex6, char('-'), hex6), char(']'))(input)?;

    let id = format!("{}{}", high, low).to_ascii_uppercase();
    Ok((rest, ControllerId(id)))
}

// <...> with no delimiter inside
fn record(input: &str) -> IResult<&str, &str> {
    delimited(char('<'), take_till(|c| c == '<' || c == '>'), char('>'))(input)
}

impl Frame {
    /// Splits a raw datagram. `sender` is only consulted for headerless
    /// datagrams, and only when it is `Some`.
    pub fn parse(payload: &[u8], sender: Option<IpAddr>) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(payload).map_err(|_| FrameError::NotUtf8)?;
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if text.is_empty() {
            return Err(FrameError::Empty);
        }

        let (controller, body) = match header(text) {
            Ok((body, controller)) => (controller, body),
            Err(_) => match sender {
                Some(addr) if text.starts_with('<') => (ControllerId::from(addr), text),
                _ => return Err(FrameError::MissingHeader(Self::excerpt(text))),
            },
        };

        let (records, malformed) = Self::split_records(body);

        Ok(Self {
            controller,
            records,
            malformed,
        })
    }

    // records are chained as <...><...>. Anything else up to the next '<'
    // is malformed: stray text, a record opened twice, or one cut off at the
    // end of the datagram.
    fn split_records(body: &str) -> (Vec<String>, Vec<String>) {
        let mut records = Vec::new();
        let mut malformed = Vec::new();
        let mut rest = body.trim_start();

        while !rest.is_empty() {
            match record(rest) {
                Ok((next, inner)) => {
                    let inner = inner.trim();
                    if !inner.is_empty() {
                        records.push(inner.to_string());
                    }
                    rest = next;
                }
                Err(_) => {
                    let end = rest
                        .char_indices()
                        .skip(1)
                        .find(|(_, c)| *c == '<')
                        .map_or(rest.len(), |(i, _)| i);
                    let piece = rest[..end].trim_start_matches('<').trim();
                    if !piece.is_empty() {
                        malformed.push(piece.to_string());
                    }
                    rest = &rest[end..];
                }
            }
            rest = rest.trim_start();
        }

        (records, malformed)
    }

    fn excerpt(text: &str) -> String {
        text.chars().take(32).collect()
    }
}
