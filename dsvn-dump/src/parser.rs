//! Pull parser for Subversion dump files (format versions 2 and 3).
//!
//! Intentionally strict: any structural violation aborts with an error
//! rather than attempting recovery.

use std::collections::VecDeque;
use std::io::BufRead;

use crate::error::{DumpError, Result};
use crate::event::{DumpProperties, ParseEvent, UserProperties};
use crate::line_reader::LineReader;

/// Where the parser currently sits in the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Looking for blank lines, then either the next revision header or
    /// the end of the file.
    TopLevel,
    /// Inside a revision, looking for the next node or the end of the
    /// revision's nodes.
    RevisionNodes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Streaming,
    Finished,
}

/// A pull parser over a `BufRead` source. Produces a bounded batch of
/// events per call into an internal queue — never the whole file at
/// once — so memory use stays O(one header window plus one text block).
pub struct Parser<R> {
    reader: LineReader<R>,
    version: u32,
    cursor: Cursor,
    state: State,
    queue: VecDeque<ParseEvent>,
}

/// Parses the dump file in `source`, returning a `Parser` ready to be
/// pulled via `next_event` or iterated directly.
pub fn parse<R: BufRead>(source: R) -> Result<Parser<R>> {
    Parser::new(source)
}

impl<R: BufRead> Parser<R> {
    pub fn new(source: R) -> Result<Self> {
        let reader = LineReader::new(source)?;
        let mut parser = Parser {
            reader,
            version: 0,
            cursor: Cursor::TopLevel,
            state: State::Streaming,
            queue: VecDeque::new(),
        };
        parser.parse_header()?;
        Ok(parser)
    }

    /// The dump-format version declared by the header (2 or 3).
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Pulls the next parse event, or `None` once `EndDumpfile` has been
    /// yielded. Returns `Some(Err(_))` exactly once, on the event at
    /// which a structural violation was detected; subsequent calls
    /// return `None`.
    pub fn next_event(&mut self) -> Option<Result<ParseEvent>> {
        loop {
            if let Some(evt) = self.queue.pop_front() {
                return Some(Ok(evt));
            }
            if self.state == State::Finished {
                return None;
            }
            if let Err(e) = self.step() {
                self.state = State::Finished;
                return Some(Err(e));
            }
        }
    }

    fn step(&mut self) -> Result<()> {
        match self.cursor {
            Cursor::TopLevel => self.step_top_level(),
            Cursor::RevisionNodes => self.step_revision_nodes(),
        }
    }

    // ---- dumpfile header -------------------------------------------------

    fn parse_header(&mut self) -> Result<()> {
        self.skip_blank_lines()?;
        let version_bytes = self.parse_named_property(b"SVN-fs-dump-format-version")?;
        let version = parse_u32(&version_bytes)
            .ok_or_else(|| self.format_error("SVN-fs-dump-format-version is not a number"))?;
        if !(2..=3).contains(&version) {
            return Err(DumpError::version(format!(
                "only dump format versions 2 and 3 are supported, found {}",
                version
            )));
        }
        self.version = version;

        self.skip_blank_lines()?;
        let uuid = if self.reader.current_line().starts_with(b"UUID: ") {
            Some(self.parse_named_property(b"UUID")?)
        } else {
            None
        };

        self.queue
            .push_back(ParseEvent::BeginDumpfile { version, uuid });
        Ok(())
    }

    // ---- top level: blank lines, revisions, EndDumpfile -------------------

    fn step_top_level(&mut self) -> Result<()> {
        self.push_blank_lines()?;
        if self.matches_dump_property(b"Revision-number") {
            self.parse_revision_header()?;
            self.cursor = Cursor::RevisionNodes;
        } else {
            if !self.reader.eof() {
                return Err(self.format_error("expected a revision or end of input"));
            }
            self.queue.push_back(ParseEvent::EndDumpfile);
            self.state = State::Finished;
        }
        Ok(())
    }

    fn parse_revision_header(&mut self) -> Result<()> {
        let mut props = DumpProperties::new();
        self.parse_named_property_into(b"Revision-number", &mut props)?;
        let plen_bytes = self.parse_named_property_into(b"Prop-content-length", &mut props)?;
        let clen_bytes = self.parse_named_property_into(b"Content-length", &mut props)?;
        let plen = parse_usize(&plen_bytes)
            .ok_or_else(|| self.format_error("Prop-content-length is not a number"))?;
        let clen = parse_usize(&clen_bytes)
            .ok_or_else(|| self.format_error("Content-length is not a number"))?;
        if clen != plen {
            return Err(self.format_error("a revision never has text content: Content-length must equal Prop-content-length"));
        }

        self.queue.push_back(ParseEvent::BeginRevision(props));

        if plen > 0 {
            if !self.matches_blank_line() {
                return Err(self.format_error("expected a blank line before revision properties"));
            }
            self.queue.push_back(self.parse_blank_line()?);
            let user_props = self.parse_user_properties(plen, false)?;
            self.queue.push_back(ParseEvent::UserProperties(user_props));
        }
        self.push_blank_lines()?;
        self.queue.push_back(ParseEvent::EndRevisionHeader);
        Ok(())
    }

    // ---- nodes within a revision -------------------------------------------

    fn step_revision_nodes(&mut self) -> Result<()> {
        if self.matches_dump_property(b"Node-path") {
            self.parse_node()?;
        } else {
            self.queue.push_back(ParseEvent::EndRevisionNodes);
            self.cursor = Cursor::TopLevel;
        }
        Ok(())
    }

    fn parse_node(&mut self) -> Result<()> {
        let mut props = DumpProperties::new();
        self.parse_named_property_into(b"Node-path", &mut props)?;

        let mut tlen: Option<usize> = None;
        let mut plen: Option<usize> = None;
        let mut clen: Option<usize> = None;
        while self.matches_any_dump_property() {
            let (name, value) = self.parse_dump_property_into(&mut props)?;
            match name.as_slice() {
                b"Text-content-length" => {
                    tlen = Some(parse_usize(&value)
                        .ok_or_else(|| self.format_error("Text-content-length is not a number"))?)
                }
                b"Prop-content-length" => {
                    plen = Some(parse_usize(&value)
                        .ok_or_else(|| self.format_error("Prop-content-length is not a number"))?)
                }
                b"Content-length" => {
                    clen = Some(parse_usize(&value)
                        .ok_or_else(|| self.format_error("Content-length is not a number"))?)
                }
                _ => {}
            }
        }

        let prop_delta = props.get(&b"Prop-delta".to_vec()).map(Vec::as_slice) == Some(b"true");
        if prop_delta && self.version == 2 {
            return Err(DumpError::version(
                "Prop-delta should not occur in a version-2 dumpfile",
            ));
        }
        let text_delta = props.get(&b"Text-delta".to_vec()).map(Vec::as_slice) == Some(b"true");
        if text_delta && self.version == 2 {
            return Err(DumpError::version(
                "Text-delta should not occur in a version-2 dumpfile",
            ));
        }

        let clen = clen.unwrap_or(0);
        let plen = plen.unwrap_or(0);
        let tlen = match tlen {
            Some(tlen) => {
                let expected = clen
                    .checked_sub(plen)
                    .ok_or_else(|| self.format_error("Content-length is smaller than Prop-content-length"))?;
                if tlen != expected {
                    return Err(self.format_error(
                        "Text-content-length is inconsistent with Content-length - Prop-content-length",
                    ));
                }
                tlen
            }
            None => clen
                .checked_sub(plen)
                .ok_or_else(|| self.format_error("Content-length is smaller than Prop-content-length"))?,
        };

        let md5_hex = props.get(&b"Text-content-md5".to_vec()).cloned();

        self.queue.push_back(ParseEvent::BeginNode(props));

        if plen > 0 || tlen > 0 {
            if !self.matches_blank_line() {
                return Err(self.format_error("expected a blank line before node property/text body"));
            }
            self.queue.push_back(self.parse_blank_line()?);
        }

        if plen > 0 {
            let user_props = self.parse_user_properties(plen, prop_delta)?;
            self.queue.push_back(ParseEvent::UserProperties(user_props));
        }

        if tlen > 0 {
            let text = self.get_bytes(tlen)?;
            if !text_delta {
                if let Some(expected) = md5_hex {
                    let computed = format!("{:x}", md5::compute(&text));
                    if computed.as_bytes() != expected.as_slice() {
                        return Err(DumpError::checksum(
                            format!(
                                "Text-content-md5 mismatch: expected {}, computed {}",
                                String::from_utf8_lossy(&expected),
                                computed
                            ),
                            self.reader.snapshot(),
                        ));
                    }
                }
            }
            self.queue.push_back(ParseEvent::TextContent(text));
            self.queue.push_back(ParseEvent::BlankLine);
        }

        self.push_blank_lines()?;
        self.queue.push_back(ParseEvent::EndNode);
        Ok(())
    }

    // ---- shared primitives --------------------------------------------------

    fn skip_blank_lines(&mut self) -> Result<()> {
        while self.matches_blank_line() {
            self.reader.advance()?;
        }
        Ok(())
    }

    fn push_blank_lines(&mut self) -> Result<()> {
        while self.matches_blank_line() {
            let evt = self.parse_blank_line()?;
            self.queue.push_back(evt);
        }
        Ok(())
    }

    fn matches_blank_line(&self) -> bool {
        self.reader.current_line() == b"\n"
    }

    fn parse_blank_line(&mut self) -> Result<ParseEvent> {
        if !self.matches_blank_line() {
            return Err(self.format_error("expected a blank line"));
        }
        self.reader.advance()?;
        Ok(ParseEvent::BlankLine)
    }

    fn matches_dump_property(&self, name: &[u8]) -> bool {
        let line = self.reader.current_line();
        line.len() > name.len() + 2
            && line.starts_with(name)
            && line[name.len()..].starts_with(b": ")
    }

    fn matches_any_dump_property(&self) -> bool {
        parse_dump_property_line(self.reader.current_line()).is_some()
    }

    fn parse_named_property(&mut self, name: &[u8]) -> Result<Vec<u8>> {
        let line = self.reader.current_line().to_vec();
        let (actual_name, value) = parse_dump_property_line(&line).ok_or_else(|| {
            self.format_error(format!(
                "expected a dump property line, found {:?}",
                String::from_utf8_lossy(&line)
            ))
        })?;
        if actual_name != name {
            return Err(self.format_error(format!(
                "expected property {}, found {}",
                String::from_utf8_lossy(name),
                String::from_utf8_lossy(&actual_name)
            )));
        }
        self.reader.advance()?;
        Ok(value)
    }

    fn parse_named_property_into(
        &mut self,
        name: &[u8],
        store: &mut DumpProperties,
    ) -> Result<Vec<u8>> {
        let value = self.parse_named_property(name)?;
        store.insert(name.to_vec(), value.clone());
        Ok(value)
    }

    fn parse_dump_property_into(&mut self, store: &mut DumpProperties) -> Result<(Vec<u8>, Vec<u8>)> {
        let line = self.reader.current_line().to_vec();
        let (name, value) = parse_dump_property_line(&line).ok_or_else(|| {
            self.format_error(format!(
                "expected a dump property line, found {:?}",
                String::from_utf8_lossy(&line)
            ))
        })?;
        self.reader.advance()?;
        store.insert(name.clone(), value.clone());
        Ok((name, value))
    }

    fn matches_user_property_end(&self) -> bool {
        self.reader.current_line() == b"PROPS-END\n"
    }

    fn parse_user_properties(&mut self, plen: usize, prop_delta: bool) -> Result<UserProperties> {
        let start = self.reader.start();
        let mut properties = UserProperties::new();
        while !self.matches_user_property_end() {
            if self.reader.eof() {
                return Err(self.format_error("unexpected end of input inside a property block"));
            }
            let line = self.reader.current_line();
            if line.starts_with(b"K ") {
                let key = self.parse_property_entry_content()?;
                if !self.reader.current_line().starts_with(b"V ") {
                    return Err(self.format_error("expected a V entry following a K entry"));
                }
                let value = self.parse_property_entry_content()?;
                properties.insert(key, Some(value));
            } else if line.starts_with(b"D ") {
                if !prop_delta {
                    return Err(self.format_error(
                        "property deletion ('D') requires Prop-delta: true on the enclosing header",
                    ));
                }
                let key = self.parse_property_entry_content()?;
                properties.insert(key, None);
            } else {
                return Err(self.format_error("expected a K, D, or PROPS-END entry"));
            }
        }
        self.reader.advance()?; // consume PROPS-END
        let stop = self.reader.start();
        if (stop - start) as usize != plen {
            return Err(self.format_error(format!(
                "user-properties block is {} bytes, but Prop-content-length declared {}",
                stop - start,
                plen
            )));
        }
        Ok(properties)
    }

    fn parse_property_entry_content(&mut self) -> Result<Vec<u8>> {
        let line = self.reader.current_line().to_vec();
        if line.len() < 2 {
            return Err(self.format_error("expected a K/V/D property entry"));
        }
        let prefix = &line[0..2];
        if prefix != b"K " && prefix != b"V " && prefix != b"D " {
            return Err(self.format_error("expected a K/V/D property entry"));
        }
        let rest = strip_trailing_newline(&line[2..]);
        let n = parse_usize(rest)
            .ok_or_else(|| self.format_error("property entry length is not a number"))?;
        self.reader.advance()?;
        self.get_bytes(n)
    }

    /// Returns the next `n` bytes of input (which may span several
    /// physical lines), consuming one additional trailing `\n` that is
    /// not included in the result.
    fn get_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut total = 0usize;
        while n >= total && !self.reader.eof() {
            let line = self.reader.current_line();
            total += line.len();
            buf.extend_from_slice(line);
            self.reader.advance()?;
        }
        if total != n + 1 || buf.last() != Some(&b'\n') {
            return Err(self.format_error("didn't find expected newline terminator"));
        }
        buf.pop();
        Ok(buf)
    }

    fn format_error(&self, message: impl Into<String>) -> DumpError {
        DumpError::format(message, self.reader.snapshot())
    }
}

impl<R: BufRead> Iterator for Parser<R> {
    type Item = Result<ParseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event()
    }
}

fn strip_trailing_newline(bytes: &[u8]) -> &[u8] {
    match bytes.last() {
        Some(b'\n') => &bytes[..bytes.len() - 1],
        _ => bytes,
    }
}

fn is_dump_property_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Matches `^[-A-Za-z0-9_]+: (.*)$`, stripping the trailing newline from
/// the value.
fn parse_dump_property_line(line: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let line = strip_trailing_newline(line);
    let sep = line.windows(2).position(|w| w == b": ")?;
    if sep == 0 {
        return None;
    }
    let name = &line[..sep];
    if !name.iter().all(|&b| is_dump_property_name_char(b)) {
        return None;
    }
    Some((name.to_vec(), line[sep + 2..].to_vec()))
}

fn parse_usize(bytes: &[u8]) -> Option<usize> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn parse_u32(bytes: &[u8]) -> Option<u32> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}
