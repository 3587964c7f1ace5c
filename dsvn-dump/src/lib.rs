//! Streaming parser, editor, and writer for Subversion dump files
//! (format versions 2 and 3).
//!
//! The pipeline is three stages chained as plain iterators:
//! [`parse`] turns a byte source into a stream of [`ParseEvent`]s,
//! [`edit_properties`] (and friends) transform that stream, and
//! [`write_events`] serializes it back out. None of the three stages
//! materializes the whole dump file in memory.

pub mod editors;
pub mod error;
pub mod event;
pub mod line_reader;
pub mod ordered_map;
pub mod parser;
pub mod writer;

pub use editors::{
    consume_events, echo_properties, edit_properties, show_progress, EchoProperties,
    EditProperties, EditTarget, ShowProgress,
};
pub use error::{DumpError, ReaderSnapshot, Result};
pub use event::{serialize_dump_properties, serialize_user_properties, DumpProperties, ParseEvent, UserProperties};
pub use line_reader::LineReader;
pub use ordered_map::OrderedMap;
pub use parser::{parse, Parser};
pub use writer::write_events;
