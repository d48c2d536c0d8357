//! Module to compile textual XML into the Android binary XML format
//! Used for the APK manifest, which Android only accepts in binary form

use anyhow::Result;
use byteorder::{WriteBytesExt, LE};
use std::io::Write;

mod encoder;
mod res_ids;
mod string_pool;
mod writer;

pub use encoder::encode;
pub use res_ids::{resource_id, ANDROID_NS_URI};
pub use string_pool::{StringPool, StringRef};

#[derive(Copy, Clone, PartialEq, Debug)]
enum ChunkType {
    StringPool,
    Xml,
    XmlResourceMap,
    XmlStartNamespace,
    XmlEndNamespace,
    XmlStartElement,
    XmlEndElement,
    XmlCdata,
}

impl ChunkType {
    fn save(&self) -> u32 {
        let header_size = match self {
            ChunkType::StringPool => 0x001C,
            ChunkType::XmlResourceMap | ChunkType::Xml => 0x0008,
            _ => 0x0010,
        };

        let id = match self {
            ChunkType::StringPool => 0x0001,
            ChunkType::Xml => 0x0003,
            ChunkType::XmlResourceMap => 0x0180,
            ChunkType::XmlStartNamespace => 0x0100,
            ChunkType::XmlEndNamespace => 0x0101,
            ChunkType::XmlStartElement => 0x0102,
            ChunkType::XmlEndElement => 0x0103,
            ChunkType::XmlCdata => 0x0104,
        };

        id | header_size << 16
    }
}

// Writes the header for a chunk.
// The `length` does not include the chunk header (8 bytes).
fn write_chunk_header(to: &mut impl Write, chunk_type: ChunkType, length: u32) -> Result<()> {
    to.write_u32::<LE>(chunk_type.save())?;
    to.write_u32::<LE>(length + 8)?; // Account for the chunk type and chunk length, each of which is 4 bytes.

    Ok(())
}
