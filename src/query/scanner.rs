//! Macro Scanner
//!
//! Tokenizes opaque query text into literal runs and macro candidates.
//!
//! # Candidate Syntax
//!
//! ```text
//! {{ [whitespace] body [whitespace] }}
//! ```
//!
//! `body` is a run of characters that are neither whitespace nor `}`. The
//! scanner does not know what a body means: each candidate is offered to the
//! caller, which either accepts it (the span is consumed) or ignores it, in
//! which case scanning resumes one character after the candidate's opening
//! brace. This mirrors a leftmost regular-expression scan, so
//! `{{{ __time_from:date }}` still yields the inner macro.

use nom::{
    bytes::complete::{tag, take_while, take_while1},
    sequence::{delimited, pair},
    IResult,
};

/// A macro candidate found in the scanned text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    /// Byte offset of the opening `{{`
    pub start: usize,
    /// Byte offset just past the closing `}}`
    pub end: usize,
    /// Text between the braces, surrounding whitespace removed
    pub body: &'a str,
}

impl<'a> Candidate<'a> {
    /// The full candidate text including braces
    pub fn raw(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// Left-to-right tokenizer over query text
#[derive(Debug, Clone)]
pub struct MacroScanner<'a> {
    text: &'a str,
    /// Next byte offset to search from
    pos: usize,
    /// Start of the literal run not yet handed out
    flushed: usize,
}

impl<'a> MacroScanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            flushed: 0,
        }
    }

    /// Find the next macro candidate
    ///
    /// A candidate that is not passed to [`accept`](Self::accept) is simply
    /// skipped by the next call.
    pub fn next_candidate(&mut self) -> Option<Candidate<'a>> {
        while let Some(found) = self.text[self.pos..].find("{{") {
            let start = self.pos + found;
            // `{` is ASCII, so one byte on is always a char boundary
            self.pos = start + 1;

            if let Ok((rest, body)) = macro_span(&self.text[start..]) {
                return Some(Candidate {
                    start,
                    end: self.text.len() - rest.len(),
                    body,
                });
            }
        }

        self.pos = self.text.len();
        None
    }

    /// Consume a candidate, returning the literal text preceding it
    pub fn accept(&mut self, candidate: &Candidate<'a>) -> &'a str {
        let literal = &self.text[self.flushed..candidate.start];
        self.pos = candidate.end;
        self.flushed = candidate.end;
        literal
    }

    /// Literal text after the last accepted candidate
    pub fn remainder(&self) -> &'a str {
        &self.text[self.flushed..]
    }
}

/// Parse `{{ body }}` at the start of the input, returning the body
fn macro_span(input: &str) -> IResult<&str, &str> {
    delimited(
        pair(tag("{{"), take_while(char::is_whitespace)),
        take_while1(|c: char| !c.is_whitespace() && c != '}'),
        pair(take_while(char::is_whitespace), tag("}}")),
    )(input)
}
