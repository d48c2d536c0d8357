//! Deduplicated UTF-16 string pool, the first chunk of every binary XML file.

use anyhow::{anyhow, Context, Result};
use byteorder::{WriteBytesExt, LE};
use std::{collections::HashMap, io::Write};

use crate::{write_chunk_header, ChunkType};

/// Identifier of an interned string. Remains valid across [`StringPool::sort`];
/// use [`StringPool::resolve`] to obtain the serialized index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StringRef(u32);

struct Entry {
    value: String,
    // UTF-16 code units, precomputed at intern time so length errors
    // surface where the string enters the pool.
    units: Vec<u16>,
    id: u32,
}

impl Entry {
    // Serialized length: 16-bit unit count, the units, a 16-bit terminator.
    fn encoded_len(&self) -> usize {
        2 + self.units.len() * 2 + 2
    }
}

/// String pool for one binary XML document.
///
/// Strings are interned in encounter order, then [`sort`](Self::sort) reorders
/// the pool by code point before serialization. `StringRef`s handed out by
/// [`intern`](Self::intern) survive the sort.
pub struct StringPool {
    entries: Vec<Entry>,
    lookup: HashMap<String, StringRef>,
    // Maps insertion id to the entry's current position.
    remap: Vec<u32>,
}

impl StringPool {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            lookup: HashMap::new(),
            remap: Vec::new(),
        }
    }

    /// Returns the ref of `s`, interning it if this is its first appearance.
    pub fn intern(&mut self, s: &str) -> Result<StringRef> {
        if let Some(existing) = self.lookup.get(s) {
            return Ok(*existing);
        }

        let units: Vec<u16> = s.encode_utf16().collect();
        if units.len() >= 0x8000 {
            return Err(anyhow!(
                "string of {} UTF-16 units requires the long-form length encoding, which is not supported",
                units.len()
            ));
        }

        let id = self
            .entries
            .len()
            .try_into()
            .context("String pool too large")?;
        let string_ref = StringRef(id);
        self.entries.push(Entry {
            value: s.to_string(),
            units,
            id,
        });
        self.remap.push(id);
        self.lookup.insert(s.to_string(), string_ref);
        Ok(string_ref)
    }

    /// Reorders the pool by unsigned code point and rewrites the index table
    /// so outstanding refs resolve to the new positions. Ties cannot occur
    /// since the pool is deduplicated.
    pub fn sort(&mut self) {
        self.entries.sort_unstable_by(|a, b| a.value.cmp(&b.value));
        for (index, entry) in self.entries.iter().enumerate() {
            self.remap[entry.id as usize] = index as u32;
        }
    }

    /// The serialized index of an interned string.
    pub fn resolve(&self, string_ref: StringRef) -> u32 {
        self.remap[string_ref.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pool contents in serialized order.
    pub fn strings(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.value.as_str())
    }

    /// Writes the STRING_POOL chunk: header, per-entry offsets, UTF-16LE
    /// string data, zero padding out to a 4-byte boundary.
    pub fn serialize(&self, out: &mut impl Write) -> Result<()> {
        let count: u32 = self
            .entries
            .len()
            .try_into()
            .context("String pool too large")?;

        let data_len: usize = self.entries.iter().map(Entry::encoded_len).sum();
        let padding = (4 - data_len % 4) % 4;
        let offsets_len = self.entries.len() * 4;
        let payload_len: u32 = (20 + offsets_len + data_len + padding)
            .try_into()
            .context("String pool too large")?;

        write_chunk_header(out, ChunkType::StringPool, payload_len)?;
        out.write_u32::<LE>(count)?;
        out.write_u32::<LE>(0)?; // Style count, not implemented
        out.write_u32::<LE>(0)?; // No flags set means UTF-16
        out.write_u32::<LE>(28 + offsets_len as u32)?; // Offset to string data from chunk start
        out.write_u32::<LE>(0)?; // Offset to styles (none)

        let mut offset = 0u32;
        for entry in &self.entries {
            out.write_u32::<LE>(offset)?;
            offset += entry.encoded_len() as u32;
        }

        for entry in &self.entries {
            out.write_u16::<LE>(entry.units.len() as u16)?;
            for unit in &entry.units {
                out.write_u16::<LE>(*unit)?;
            }
            out.write_u16::<LE>(0)?;
        }

        for _ in 0..padding {
            out.write_u8(0)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ByteOrder;

    #[test]
    fn intern_deduplicates() {
        let mut pool = StringPool::new();
        let first = pool.intern("manifest").unwrap();
        let again = pool.intern("manifest").unwrap();
        assert_eq!(first, again);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn refs_survive_sorting() {
        let mut pool = StringPool::new();
        let zebra = pool.intern("zebra").unwrap();
        let apple = pool.intern("apple").unwrap();
        let mango = pool.intern("mango").unwrap();
        pool.sort();

        assert_eq!(pool.resolve(apple), 0);
        assert_eq!(pool.resolve(mango), 1);
        assert_eq!(pool.resolve(zebra), 2);
        assert_eq!(
            pool.strings().collect::<Vec<_>>(),
            vec!["apple", "mango", "zebra"]
        );
    }

    #[test]
    fn sorted_pool_is_monotonic() {
        let mut pool = StringPool::new();
        for s in ["versionName", "1.0", "Balloon", "activity", "label"] {
            pool.intern(s).unwrap();
        }
        pool.sort();

        let strings: Vec<&str> = pool.strings().collect();
        for pair in strings.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn serializes_bmp_string_as_utf16le() {
        let mut pool = StringPool::new();
        pool.intern("Balloon世界").unwrap();

        let mut bytes = Vec::new();
        pool.serialize(&mut bytes).unwrap();

        let expected: &[u8] = &[
            0x09, 0x00, // 9 UTF-16 code units
            0x42, 0x00, 0x61, 0x00, 0x6c, 0x00, 0x6c, 0x00, 0x6f, 0x00, 0x6f, 0x00, 0x6e, 0x00,
            0x16, 0x4e, 0x4c, 0x75, // 世界
            0x00, 0x00, // terminator
        ];
        assert!(bytes
            .windows(expected.len())
            .any(|window| window == expected));
    }

    #[test]
    fn first_offset_is_zero_and_header_is_consistent() {
        let mut pool = StringPool::new();
        pool.intern("uses-sdk").unwrap();
        pool.intern("application").unwrap();
        pool.sort();

        let mut bytes = Vec::new();
        pool.serialize(&mut bytes).unwrap();

        assert_eq!(LE::read_u16(&bytes[0..2]), 0x0001); // STRING_POOL
        assert_eq!(LE::read_u16(&bytes[2..4]), 28); // header size
        assert_eq!(LE::read_u32(&bytes[4..8]) as usize, bytes.len());
        assert_eq!(LE::read_u32(&bytes[8..12]), 2); // string count
        assert_eq!(LE::read_u32(&bytes[28..32]), 0); // offset of string 0
        assert_eq!(bytes.len() % 4, 0);
    }

    #[test]
    fn rejects_strings_needing_long_form_length() {
        let mut pool = StringPool::new();
        let too_long = "a".repeat(0x8000);
        assert!(pool.intern(&too_long).is_err());
    }
}
