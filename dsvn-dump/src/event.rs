//! Parse events yielded by the pull parser and consumed by editors and
//! the writer.

use crate::ordered_map::OrderedMap;

/// Dump properties (revision or node headers) are an ordered mapping
/// from property name to raw value bytes.
pub type DumpProperties = OrderedMap<Vec<u8>, Vec<u8>>;

/// User properties (Subversion properties proper). `None` marks a
/// deletion record, legal only when the enclosing header declared
/// `Prop-delta: true`.
pub type UserProperties = OrderedMap<Vec<u8>, Option<Vec<u8>>>;

/// One event in the parse/edit/write pipeline. See the grammar this
/// crate implements for the legal orderings of these variants.
#[derive(Debug, Clone)]
pub enum ParseEvent {
    BeginDumpfile { version: u32, uuid: Option<Vec<u8>> },
    EndDumpfile,
    BeginRevision(DumpProperties),
    EndRevisionHeader,
    EndRevisionNodes,
    BeginNode(DumpProperties),
    EndNode,
    UserProperties(UserProperties),
    TextContent(Vec<u8>),
    BlankLine,
}

impl ParseEvent {
    /// Renders this event to the exact bytes a conforming writer would
    /// emit for it. `TextContent` renders to its raw payload with no
    /// trailing newline — the grammar always pairs it with a following
    /// `BlankLine` event that supplies the terminator.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ParseEvent::BeginDumpfile { version, uuid } => {
                let mut out = format!("SVN-fs-dump-format-version: {}\n\n", version).into_bytes();
                if let Some(uuid) = uuid {
                    out.extend_from_slice(b"UUID: ");
                    out.extend_from_slice(uuid);
                    out.push(b'\n');
                }
                out
            }
            ParseEvent::EndDumpfile => Vec::new(),
            ParseEvent::BeginRevision(props) | ParseEvent::BeginNode(props) => {
                serialize_dump_properties(props)
            }
            ParseEvent::EndRevisionHeader | ParseEvent::EndRevisionNodes | ParseEvent::EndNode => {
                Vec::new()
            }
            ParseEvent::UserProperties(props) => serialize_user_properties(props),
            ParseEvent::TextContent(bytes) => bytes.clone(),
            ParseEvent::BlankLine => vec![b'\n'],
        }
    }
}

/// Serializes a dump-property block as `Name: Value\n` lines in
/// recorded key order.
pub fn serialize_dump_properties(props: &DumpProperties) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in props.iter() {
        out.extend_from_slice(key);
        out.extend_from_slice(b": ");
        out.extend_from_slice(value);
        out.push(b'\n');
    }
    out
}

/// Serializes a user-properties block per the `K`/`V`/`D`/`PROPS-END`
/// grammar. The byte length of this output is what `Prop-content-length`
/// must declare.
pub fn serialize_user_properties(props: &UserProperties) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in props.iter() {
        match value {
            Some(value) => {
                out.extend_from_slice(format!("K {}\n", key.len()).as_bytes());
                out.extend_from_slice(key);
                out.push(b'\n');
                out.extend_from_slice(format!("V {}\n", value.len()).as_bytes());
                out.extend_from_slice(value);
                out.push(b'\n');
            }
            None => {
                out.extend_from_slice(format!("D {}\n", key.len()).as_bytes());
                out.extend_from_slice(key);
                out.push(b'\n');
            }
        }
    }
    out.extend_from_slice(b"PROPS-END\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_dumpfile_without_uuid() {
        let evt = ParseEvent::BeginDumpfile {
            version: 2,
            uuid: None,
        };
        assert_eq!(evt.to_bytes(), b"SVN-fs-dump-format-version: 2\n\n");
    }

    #[test]
    fn begin_dumpfile_with_uuid() {
        let evt = ParseEvent::BeginDumpfile {
            version: 3,
            uuid: Some(b"1234".to_vec()),
        };
        assert_eq!(
            evt.to_bytes(),
            b"SVN-fs-dump-format-version: 3\n\nUUID: 1234\n"
        );
    }

    #[test]
    fn user_properties_round_trip_bytes() {
        let mut props = UserProperties::new();
        props.insert(b"svn:log".to_vec(), Some(b"hello world".to_vec()));
        let bytes = serialize_user_properties(&props);
        assert_eq!(bytes, b"K 7\nsvn:log\nV 11\nhello world\nPROPS-END\n");
    }

    #[test]
    fn user_properties_deletion_record() {
        let mut props = UserProperties::new();
        props.insert(b"svn:ignore".to_vec(), None);
        let bytes = serialize_user_properties(&props);
        assert_eq!(bytes, b"D 10\nsvn:ignore\nPROPS-END\n");
    }

    #[test]
    fn dump_properties_preserve_order() {
        let mut props = DumpProperties::new();
        props.insert(b"Revision-number".to_vec(), b"1".to_vec());
        props.insert(b"Prop-content-length".to_vec(), b"0".to_vec());
        let bytes = serialize_dump_properties(&props);
        assert_eq!(
            bytes,
            b"Revision-number: 1\nProp-content-length: 0\n"
        );
    }
}
