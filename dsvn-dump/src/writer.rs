//! Validating writer: serializes an event stream to a byte sink,
//! re-checking every framing invariant a conforming parser would have
//! enforced on the way in.

use std::io::Write;

use crate::error::{DumpError, Result};
use crate::event::{serialize_user_properties, ParseEvent};

/// Per-node/per-revision framing state the writer tracks while
/// streaming, cleared at `EndNode` / `EndRevisionHeader`.
#[derive(Default)]
struct Frame {
    text_content_md5: Option<Vec<u8>>,
    text_content_length: Option<usize>,
    prop_content_length: Option<usize>,
}

/// Writes `events` to `sink` as a dump file, closing `sink` on every
/// exit path (success or failure).
pub fn write_events<W: Write, I>(events: I, mut sink: W) -> Result<()>
where
    I: IntoIterator<Item = Result<ParseEvent>>,
{
    let result = write_events_inner(events, &mut sink);
    sink.flush().ok();
    result
}

fn write_events_inner<W: Write, I>(events: I, sink: &mut W) -> Result<()>
where
    I: IntoIterator<Item = Result<ParseEvent>>,
{
    let mut version: Option<u32> = None;
    let mut frame = Frame::default();

    for evt in events {
        let evt = evt?;

        if let ParseEvent::BeginDumpfile { version: v, .. } = &evt {
            if !(2..=3).contains(v) {
                return Err(DumpError::version(format!(
                    "only dump format versions 2 and 3 are supported, found {}",
                    v
                )));
            }
            version = Some(*v);
        }

        if version == Some(2) {
            check_version2_constraints(&evt)?;
        }

        match &evt {
            ParseEvent::BeginNode(props) => {
                frame.text_content_md5 = if prop_is_true(props, b"Text-delta") {
                    None
                } else {
                    props.get(&b"Text-content-md5".to_vec()).cloned()
                };
                frame.text_content_length = Some(
                    props
                        .get(&b"Text-content-length".to_vec())
                        .and_then(|v| std::str::from_utf8(v).ok())
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0),
                );
                frame.prop_content_length = Some(
                    props
                        .get(&b"Prop-content-length".to_vec())
                        .and_then(|v| std::str::from_utf8(v).ok())
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0),
                );
            }
            ParseEvent::EndNode => {
                frame = Frame::default();
            }
            ParseEvent::BeginRevision(props) => {
                frame.prop_content_length = Some(
                    props
                        .get(&b"Prop-content-length".to_vec())
                        .and_then(|v| std::str::from_utf8(v).ok())
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0),
                );
            }
            ParseEvent::EndRevisionHeader => {
                frame = Frame::default();
            }
            ParseEvent::TextContent(bytes) => {
                if let Some(expected_len) = frame.text_content_length {
                    if bytes.len() != expected_len {
                        return Err(DumpError::EditConsistency(format!(
                            "text length mismatch: Text-content-length declared {}, actual {}",
                            expected_len,
                            bytes.len()
                        )));
                    }
                }
                if let Some(expected) = &frame.text_content_md5 {
                    let computed = format!("{:x}", md5::compute(bytes));
                    if computed.as_bytes() != expected.as_slice() {
                        return Err(DumpError::EditConsistency(format!(
                            "MD5 mismatch: Text-content-md5 declared {}, computed {}",
                            String::from_utf8_lossy(expected),
                            computed
                        )));
                    }
                }
            }
            ParseEvent::UserProperties(props) => {
                let serialized = serialize_user_properties(props);
                if let Some(expected_len) = frame.prop_content_length {
                    if serialized.len() != expected_len {
                        return Err(DumpError::EditConsistency(format!(
                            "property length mismatch: Prop-content-length declared {}, actual {}",
                            expected_len,
                            serialized.len()
                        )));
                    }
                }
            }
            _ => {}
        }

        sink.write_all(&evt.to_bytes())?;
    }

    Ok(())
}

fn check_version2_constraints(evt: &ParseEvent) -> Result<()> {
    match evt {
        ParseEvent::UserProperties(props) => {
            if props.values().any(Option::is_none) {
                return Err(DumpError::version(
                    "property deletion requires Prop-delta: true and dump format version 3 or higher",
                ));
            }
        }
        ParseEvent::BeginRevision(props) | ParseEvent::BeginNode(props) => {
            if prop_is_true(props, b"Prop-delta") {
                return Err(DumpError::version(
                    "dump format must be at least version 3 to support Prop-delta",
                ));
            }
            if let ParseEvent::BeginNode(_) = evt {
                if prop_is_true(props, b"Text-delta") {
                    return Err(DumpError::version(
                        "dump format must be at least version 3 to support Text-delta",
                    ));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn prop_is_true(props: &crate::event::DumpProperties, key: &[u8]) -> bool {
    props.get(&key.to_vec()).map(Vec::as_slice) == Some(b"true")
}
