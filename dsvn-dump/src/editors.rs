//! Pipeline stages that sit between the parser and the writer: an
//! editor that rewrites properties (and keeps framing lengths
//! coherent), a diagnostic echo stage, a sink, and a progress reporter.

use std::collections::VecDeque;
use std::io::Write;

use crate::error::{DumpError, Result};
use crate::event::{serialize_user_properties, DumpProperties, ParseEvent, UserProperties};

/// The property map passed to an edit callback: dump properties for a
/// `BeginRevision`/`BeginNode` header, or user properties for the
/// `UserProperties` event nested inside it.
pub enum EditTarget<'a> {
    Header(&'a mut DumpProperties),
    User(&'a mut UserProperties),
}

/// Invokes `edit` on each `BeginRevision`/`BeginNode` header and on the
/// `UserProperties` nested within it (if any), then rewrites
/// `Prop-content-length`/`Content-length` on the header to match the
/// edited property block's serialized length before re-emitting the
/// buffered window in original order.
pub fn edit_properties<I, F>(events: I, edit: F) -> EditProperties<I::IntoIter, F>
where
    I: IntoIterator<Item = Result<ParseEvent>>,
    F: FnMut(&mut EditTarget),
{
    EditProperties {
        inner: events.into_iter(),
        edit,
        queue: VecDeque::new(),
        done: false,
    }
}

pub struct EditProperties<I, F> {
    inner: I,
    edit: F,
    queue: VecDeque<Result<ParseEvent>>,
    done: bool,
}

impl<I, F> Iterator for EditProperties<I, F>
where
    I: Iterator<Item = Result<ParseEvent>>,
    F: FnMut(&mut EditTarget),
{
    type Item = Result<ParseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Some(item);
            }
            if self.done {
                return None;
            }
            match self.inner.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok(ParseEvent::EndDumpfile)) => {
                    self.done = true;
                    return Some(Ok(ParseEvent::EndDumpfile));
                }
                Some(Ok(evt @ ParseEvent::BeginRevision(_)))
                | Some(Ok(evt @ ParseEvent::BeginNode(_))) => {
                    if let Err(e) = self.process_header_window(evt) {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
                Some(Ok(other)) => return Some(Ok(other)),
            }
        }
    }
}

impl<I, F> EditProperties<I, F>
where
    I: Iterator<Item = Result<ParseEvent>>,
    F: FnMut(&mut EditTarget),
{
    /// Buffers a header and every event up to its terminator
    /// (`EndRevisionHeader`/`EndNode`), edits the header and its
    /// `UserProperties` (if any), recomputes framing lengths, and
    /// queues the whole window for emission.
    fn process_header_window(&mut self, evt: ParseEvent) -> Result<()> {
        let is_node = matches!(evt, ParseEvent::BeginNode(_));
        let mut header_props = match evt {
            ParseEvent::BeginRevision(p) | ParseEvent::BeginNode(p) => p,
            _ => unreachable!(),
        };
        (self.edit)(&mut EditTarget::Header(&mut header_props));

        let mut held: Vec<ParseEvent> = Vec::new();
        let mut user_props_idx: Option<usize> = None;
        let terminator;

        loop {
            let next_evt = match self.inner.next() {
                None => {
                    return Err(DumpError::EditConsistency(
                        "stream ended before the header window's terminator".into(),
                    ))
                }
                Some(Err(e)) => return Err(e),
                Some(Ok(e)) => e,
            };
            match next_evt {
                ParseEvent::EndRevisionHeader if !is_node => {
                    terminator = ParseEvent::EndRevisionHeader;
                    break;
                }
                ParseEvent::EndNode if is_node => {
                    terminator = ParseEvent::EndNode;
                    break;
                }
                ParseEvent::UserProperties(up) => {
                    if user_props_idx.is_some() {
                        return Err(DumpError::EditConsistency(
                            "more than one UserProperties event in a single header window"
                                .into(),
                        ));
                    }
                    user_props_idx = Some(held.len());
                    held.push(ParseEvent::UserProperties(up));
                }
                other => held.push(other),
            }
        }

        if let Some(idx) = user_props_idx {
            if let ParseEvent::UserProperties(up) = &mut held[idx] {
                (self.edit)(&mut EditTarget::User(up));
                let new_prop_len = serialize_user_properties(up).len();
                header_props.insert(
                    b"Prop-content-length".to_vec(),
                    new_prop_len.to_string().into_bytes(),
                );
                let text_len = header_props
                    .get(&b"Text-content-length".to_vec())
                    .and_then(|v| std::str::from_utf8(v).ok())
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(0);
                header_props.insert(
                    b"Content-length".to_vec(),
                    (new_prop_len + text_len).to_string().into_bytes(),
                );
            }
        }

        let header_evt = if is_node {
            ParseEvent::BeginNode(header_props)
        } else {
            ParseEvent::BeginRevision(header_props)
        };
        self.queue.push_back(Ok(header_evt));
        for e in held {
            self.queue.push_back(Ok(e));
        }
        self.queue.push_back(Ok(terminator));
        Ok(())
    }
}

/// Writes selected dump-property and user-property values to `sink` as
/// events pass through, unchanged.
pub fn echo_properties<I, W>(
    events: I,
    names: Vec<Vec<u8>>,
    sink: W,
) -> EchoProperties<I::IntoIter, W>
where
    I: IntoIterator<Item = Result<ParseEvent>>,
    W: Write,
{
    EchoProperties {
        inner: events.into_iter(),
        names,
        sink,
    }
}

pub struct EchoProperties<I, W> {
    inner: I,
    names: Vec<Vec<u8>>,
    sink: W,
}

impl<I, W> Iterator for EchoProperties<I, W>
where
    I: Iterator<Item = Result<ParseEvent>>,
    W: Write,
{
    type Item = Result<ParseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        if let Ok(evt) = &item {
            match evt {
                ParseEvent::UserProperties(props) => {
                    for name in &self.names {
                        if let Some(value) = props.get(name) {
                            let _ = writeln!(
                                self.sink,
                                "{}: {:?}",
                                String::from_utf8_lossy(name),
                                value.as_ref().map(|v| String::from_utf8_lossy(v))
                            );
                        }
                    }
                }
                ParseEvent::BeginRevision(props) | ParseEvent::BeginNode(props) => {
                    for name in &self.names {
                        if let Some(value) = props.get(name) {
                            let _ = writeln!(
                                self.sink,
                                "{}: {}",
                                String::from_utf8_lossy(name),
                                String::from_utf8_lossy(value)
                            );
                        }
                    }
                }
                _ => {}
            }
        }
        Some(item)
    }
}

/// The universal sink: drains an event stream, propagating the first
/// error encountered (or `Ok(())` if the stream runs to completion).
pub fn consume_events<I>(events: I) -> Result<()>
where
    I: IntoIterator<Item = Result<ParseEvent>>,
{
    for evt in events {
        evt?;
    }
    Ok(())
}

/// Wraps an event stream, writing a '.' to `sink` for every 1000 events
/// that pass through (wrapping to a new line every 78 dots), and a
/// final newline once the stream is exhausted.
pub fn show_progress<I, W>(events: I, sink: W) -> ShowProgress<I::IntoIter, W>
where
    I: IntoIterator<Item = Result<ParseEvent>>,
    W: Write,
{
    ShowProgress {
        inner: events.into_iter(),
        sink,
        count: 0,
        finished: false,
    }
}

const PROGRESS_PERIOD: u64 = 1000;
const PROGRESS_LINE_WIDTH: u64 = 78;

pub struct ShowProgress<I, W> {
    inner: I,
    sink: W,
    count: u64,
    finished: bool,
}

impl<I, W> Iterator for ShowProgress<I, W>
where
    I: Iterator<Item = Result<ParseEvent>>,
    W: Write,
{
    type Item = Result<ParseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Some(item) => {
                self.count += 1;
                if self.count % PROGRESS_PERIOD == 0 {
                    let _ = write!(self.sink, ".");
                    if (self.count / PROGRESS_PERIOD) % PROGRESS_LINE_WIDTH == 0 {
                        let _ = writeln!(self.sink);
                    }
                }
                Some(item)
            }
            None => {
                if !self.finished {
                    self.finished = true;
                    let _ = writeln!(self.sink);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::io::Cursor;

    #[test]
    fn editing_a_user_property_shrinks_lengths() {
        let props = b"K 13\nsvn:externals\nV 32\nsvn://old.com/repos/lib ^/lib\r\n\nPROPS-END\n";
        let data = format!(
            "SVN-fs-dump-format-version: 3\n\nRevision-number: 1\nProp-content-length: {}\nContent-length: {}\n\n{}\n",
            props.len(),
            props.len(),
            String::from_utf8_lossy(props),
        );
        let parser = parse(Cursor::new(data.into_bytes())).unwrap();
        let edited = edit_properties(parser, |target| {
            if let EditTarget::User(props) = target {
                if let Some(Some(value)) = props.get(&b"svn:externals".to_vec()).cloned() {
                    let replaced = String::from_utf8_lossy(&value)
                        .replace("svn://old.com/repos/", "svn://new.com/repos/")
                        .replace("\r\n", "\n");
                    props.insert(b"svn:externals".to_vec(), Some(replaced.into_bytes()));
                }
            }
        });

        let mut out = Vec::new();
        crate::writer::write_events(edited, &mut out).unwrap();

        let reparsed: Vec<_> = parse(Cursor::new(out)).unwrap().collect();
        let user_props = reparsed
            .iter()
            .find_map(|e| match e {
                Ok(ParseEvent::UserProperties(p)) => Some(p),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            user_props.get(&b"svn:externals".to_vec()),
            Some(&Some(b"svn://new.com/repos/lib ^/lib\n".to_vec()))
        );
    }

    #[test]
    fn more_than_one_user_properties_event_is_an_edit_consistency_error() {
        let events: Vec<Result<ParseEvent>> = vec![
            Ok(ParseEvent::BeginRevision(DumpProperties::new())),
            Ok(ParseEvent::UserProperties(UserProperties::new())),
            Ok(ParseEvent::UserProperties(UserProperties::new())),
            Ok(ParseEvent::EndRevisionHeader),
            Ok(ParseEvent::EndDumpfile),
        ];
        let mut edited = edit_properties(events, |_| {});
        let err = edited.find(|e| e.is_err()).unwrap().unwrap_err();
        assert!(matches!(err, DumpError::EditConsistency(_)));
    }

    #[test]
    fn consume_events_drains_without_panicking() {
        let events: Vec<Result<ParseEvent>> = vec![Ok(ParseEvent::EndDumpfile)];
        assert!(consume_events(events).is_ok());
    }
}
