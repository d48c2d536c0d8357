//! In-memory document chunks and their byte layouts.
//!
//! Chunks are appended in document order while the XML is scanned and are
//! serialized untouched afterwards; string references are resolved against
//! the pool at write time, after the pool has been sorted.

use anyhow::{Context, Result};
use byteorder::{WriteBytesExt, LE};
use std::io::Write;

use crate::string_pool::{StringPool, StringRef};
use crate::{write_chunk_header, ChunkType};

// Reference fields use -1 for "absent", e.g. an element without a namespace.
const NO_ENTRY: u32 = 0xFFFF_FFFF;

// Res_value type tags understood by the framework.
const TYPE_STRING: u8 = 0x03;
const TYPE_INT_DEC: u8 = 0x10;
const TYPE_INT_BOOLEAN: u8 = 0x12;

#[derive(Debug)]
pub(crate) enum Chunk {
    StartNamespace {
        line: u32,
        prefix: Option<StringRef>,
        uri: StringRef,
    },
    EndNamespace {
        line: u32,
        prefix: Option<StringRef>,
        uri: StringRef,
    },
    StartElement {
        line: u32,
        namespace: Option<StringRef>,
        name: StringRef,
        attributes: Vec<Attribute>,
    },
    EndElement {
        line: u32,
        namespace: Option<StringRef>,
        name: StringRef,
    },
    Text {
        line: u32,
        text: StringRef,
    },
}

#[derive(Debug)]
pub(crate) struct Attribute {
    pub namespace: Option<StringRef>,
    pub name: StringRef,
    pub resource_id: Option<u32>,
    pub value: AttributeValue,
}

#[derive(Debug)]
pub(crate) enum AttributeValue {
    IntDec(i32),
    Boolean(bool),
    Flags(u32),
    String(StringRef),
}

impl Chunk {
    pub(crate) fn serialize(&self, pool: &StringPool, out: &mut impl Write) -> Result<()> {
        match self {
            Chunk::StartNamespace { line, prefix, uri } => {
                write_chunk_header(out, ChunkType::XmlStartNamespace, 16)?;
                write_node_header(out, *line)?;
                write_ref(out, prefix.map(|p| pool.resolve(p)))?;
                out.write_u32::<LE>(pool.resolve(*uri))?;
            }
            Chunk::EndNamespace { line, prefix, uri } => {
                write_chunk_header(out, ChunkType::XmlEndNamespace, 16)?;
                write_node_header(out, *line)?;
                write_ref(out, prefix.map(|p| pool.resolve(p)))?;
                out.write_u32::<LE>(pool.resolve(*uri))?;
            }
            Chunk::StartElement {
                line,
                namespace,
                name,
                attributes,
            } => {
                let attr_count: u16 = attributes
                    .len()
                    .try_into()
                    .context("Too many attributes for element")?;
                write_chunk_header(
                    out,
                    ChunkType::XmlStartElement,
                    28 + 20 * attr_count as u32,
                )?;
                write_node_header(out, *line)?;
                write_ref(out, namespace.map(|ns| pool.resolve(ns)))?;
                out.write_u32::<LE>(pool.resolve(*name))?;

                out.write_u16::<LE>(20)?; // offset to first attribute
                out.write_u16::<LE>(20)?; // size of one attribute
                out.write_u16::<LE>(attr_count)?;
                out.write_u16::<LE>(0)?; // id attribute index (1-based, 0 = none)
                out.write_u16::<LE>(0)?; // class attribute index
                out.write_u16::<LE>(0)?; // style attribute index

                for attribute in attributes {
                    attribute.serialize(pool, out)?;
                }
            }
            Chunk::EndElement {
                line,
                namespace,
                name,
            } => {
                write_chunk_header(out, ChunkType::XmlEndElement, 16)?;
                write_node_header(out, *line)?;
                write_ref(out, namespace.map(|ns| pool.resolve(ns)))?;
                out.write_u32::<LE>(pool.resolve(*name))?;
            }
            Chunk::Text { line, text } => {
                write_chunk_header(out, ChunkType::XmlCdata, 20)?;
                write_node_header(out, *line)?;
                out.write_u32::<LE>(pool.resolve(*text))?;
                // Res_value of a raw text node: 8-byte header, null type.
                out.write_u16::<LE>(8)?;
                out.write_u8(0)?;
                out.write_u8(0x00)?;
                out.write_u32::<LE>(0)?;
            }
        }

        Ok(())
    }
}

impl Attribute {
    fn serialize(&self, pool: &StringPool, out: &mut impl Write) -> Result<()> {
        // The raw-value field duplicates the string index for string values
        // and is -1 for everything else. Boolean true is stored as -1.
        let (raw_value, type_tag, data) = match &self.value {
            AttributeValue::IntDec(i) => (NO_ENTRY, TYPE_INT_DEC, *i as u32),
            AttributeValue::Flags(mask) => (NO_ENTRY, TYPE_INT_DEC, *mask),
            AttributeValue::Boolean(true) => (NO_ENTRY, TYPE_INT_BOOLEAN, NO_ENTRY),
            AttributeValue::Boolean(false) => (NO_ENTRY, TYPE_INT_BOOLEAN, 0),
            AttributeValue::String(string_ref) => {
                let index = pool.resolve(*string_ref);
                (index, TYPE_STRING, index)
            }
        };

        write_ref(out, self.namespace.map(|ns| pool.resolve(ns)))?;
        out.write_u32::<LE>(pool.resolve(self.name))?;
        out.write_u32::<LE>(raw_value)?;
        out.write_u16::<LE>(8)?; // Res_value size
        out.write_u8(0)?; // reserved
        out.write_u8(type_tag)?;
        out.write_u32::<LE>(data)?;
        Ok(())
    }
}

// Line number and comment reference, shared by every body chunk.
fn write_node_header(out: &mut impl Write, line: u32) -> Result<()> {
    out.write_u32::<LE>(line)?;
    out.write_u32::<LE>(NO_ENTRY)?; // comment reference, never set
    Ok(())
}

fn write_ref(out: &mut impl Write, index: Option<u32>) -> Result<()> {
    out.write_u32::<LE>(index.unwrap_or(NO_ENTRY))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ByteOrder;

    fn pool_with(strings: &[&str]) -> (StringPool, Vec<StringRef>) {
        let mut pool = StringPool::new();
        let refs = strings
            .iter()
            .map(|s| pool.intern(s).unwrap())
            .collect();
        pool.sort();
        (pool, refs)
    }

    #[test]
    fn end_element_layout() {
        let (pool, refs) = pool_with(&["manifest"]);

        let chunk = Chunk::EndElement {
            line: 26,
            namespace: None,
            name: refs[0],
        };
        let mut bytes = Vec::new();
        chunk.serialize(&pool, &mut bytes).unwrap();

        assert_eq!(bytes.len(), 24);
        assert_eq!(LE::read_u16(&bytes[0..2]), 0x0103);
        assert_eq!(LE::read_u16(&bytes[2..4]), 16);
        assert_eq!(LE::read_u32(&bytes[4..8]), 24);
        assert_eq!(LE::read_u32(&bytes[8..12]), 26); // line
        assert_eq!(LE::read_u32(&bytes[12..16]), 0xFFFF_FFFF); // comment
        assert_eq!(LE::read_u32(&bytes[16..20]), 0xFFFF_FFFF); // no namespace
        assert_eq!(LE::read_u32(&bytes[20..24]), 0); // name index
    }

    #[test]
    fn start_element_with_typed_attribute() {
        let (pool, refs) = pool_with(&["uses-sdk", "minSdkVersion", ANDROID_NS]);

        let chunk = Chunk::StartElement {
            line: 13,
            namespace: None,
            name: refs[0],
            attributes: vec![Attribute {
                namespace: Some(refs[2]),
                name: refs[1],
                resource_id: Some(0x0101_020c),
                value: AttributeValue::IntDec(9),
            }],
        };
        let mut bytes = Vec::new();
        chunk.serialize(&pool, &mut bytes).unwrap();

        assert_eq!(bytes.len(), 56);
        assert_eq!(LE::read_u16(&bytes[0..2]), 0x0102);
        assert_eq!(LE::read_u32(&bytes[4..8]), 56);
        assert_eq!(LE::read_u16(&bytes[24..26]), 20); // attribute start
        assert_eq!(LE::read_u16(&bytes[26..28]), 20); // attribute size
        assert_eq!(LE::read_u16(&bytes[28..30]), 1); // attribute count

        let attr = &bytes[36..56];
        assert_eq!(LE::read_u32(&attr[8..12]), 0xFFFF_FFFF); // raw value: not a string
        assert_eq!(LE::read_u16(&attr[12..14]), 8); // Res_value size
        assert_eq!(attr[15], 0x10); // int_dec
        assert_eq!(LE::read_u32(&attr[16..20]), 9);
    }

    #[test]
    fn boolean_encodings() {
        let (pool, refs) = pool_with(&["application", "hasCode", "debuggable", ANDROID_NS]);

        for (value, expected) in [(false, 0u32), (true, 0xFFFF_FFFF)] {
            let chunk = Chunk::StartElement {
                line: 1,
                namespace: None,
                name: refs[0],
                attributes: vec![Attribute {
                    namespace: Some(refs[3]),
                    name: refs[1],
                    resource_id: Some(0x0101_000c),
                    value: AttributeValue::Boolean(value),
                }],
            };
            let mut bytes = Vec::new();
            chunk.serialize(&pool, &mut bytes).unwrap();
            assert_eq!(bytes[51], 0x12); // int_boolean tag
            assert_eq!(LE::read_u32(&bytes[52..56]), expected);
        }
    }

    const ANDROID_NS: &str = crate::ANDROID_NS_URI;
}
