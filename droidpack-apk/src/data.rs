use std::io::{Read, Write};

use anyhow::{anyhow, Context, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};

/// Compression method field of every entry this crate writes. The APK format
/// requires uncompressed entries so Android can map them in place.
pub const METHOD_STORE: u16 = 0;

/// Minimum ZIP spec version needed to extract a store-only archive.
pub const VERSION_NEEDED_TO_EXTRACT: u16 = 20;

// ZIP end of central directory record
#[derive(Clone)]
pub struct EndOfCentDir {
    pub cent_dir_records: u16,
    pub cent_dir_size: u32,
    pub cent_dir_offset: u32,
    pub comment: Vec<u8>,
}

// ZIP central directory record
#[derive(Clone, Debug)]
pub struct CentDirHeader {
    pub os_version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub last_modified: u32,
    pub crc32: u32,
    pub compressed_len: u32,
    pub uncompressed_len: u32,

    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub local_header_offset: u32,

    pub file_name: String,
    pub extra_field: Vec<u8>,
    pub comment: String,
}

// ZIP local file header record
#[derive(Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub last_modified: u32,
    pub crc32: u32,
    pub compressed_len: u32,
    pub uncompressed_len: u32,

    pub file_name: String,
    pub extra_field: Vec<u8>,
}

impl EndOfCentDir {
    pub const HEADER: u32 = 0x06054b50;
    pub const MIN_SIZE: usize = 22;

    pub fn read(data: &mut impl Read) -> Result<Self> {
        if data.read_u32::<LE>()? != Self::HEADER {
            return Err(anyhow!("Invalid EOCD header"));
        }

        let disk_num = data.read_u16::<LE>()?;
        let start_of_cd_disk = data.read_u16::<LE>()?;
        let cd_records_on_disk = data.read_u16::<LE>()?;

        let mut result = Self {
            cent_dir_records: data.read_u16::<LE>()?,
            cent_dir_size: data.read_u32::<LE>()?,
            cent_dir_offset: data.read_u32::<LE>()?,
            comment: vec![0u8; data.read_u16::<LE>()? as usize],
        };

        data.read_exact(&mut result.comment)?;

        if result.cent_dir_records != cd_records_on_disk || start_of_cd_disk != 0 || disk_num != 0 {
            return Err(anyhow!("Multi-disk archives are not supported"));
        }

        Ok(result)
    }

    pub fn write(&self, data: &mut impl Write) -> Result<()> {
        data.write_u32::<LE>(Self::HEADER)?;

        // Single-disk archive
        data.write_u16::<LE>(0)?;
        data.write_u16::<LE>(0)?;
        data.write_u16::<LE>(self.cent_dir_records)?;

        data.write_u16::<LE>(self.cent_dir_records)?;
        data.write_u32::<LE>(self.cent_dir_size)?;
        data.write_u32::<LE>(self.cent_dir_offset)?;
        data.write_u16::<LE>(
            self.comment
                .len()
                .try_into()
                .context("Archive comment longer than max length")?,
        )?;
        data.write_all(&self.comment)?;

        Ok(())
    }
}

impl CentDirHeader {
    pub const HEADER: u32 = 0x02014b50;

    pub fn read(data: &mut impl Read) -> Result<Self> {
        if data.read_u32::<LE>()? != Self::HEADER {
            return Err(anyhow!("Invalid CD header signature"));
        }

        let version_made_by = data.read_u16::<LE>()?;
        let version_needed = data.read_u16::<LE>()?;
        let flags = data.read_u16::<LE>()?;
        if data.read_u16::<LE>()? != METHOD_STORE {
            return Err(anyhow!("Compressed entries are not supported"));
        }
        let last_modified = data.read_u32::<LE>()?;
        let crc32 = data.read_u32::<LE>()?;
        let compressed_len = data.read_u32::<LE>()?;
        let uncompressed_len = data.read_u32::<LE>()?;

        let mut file_name_buf = vec![0u8; data.read_u16::<LE>()? as usize];
        let mut extra_field_buf = vec![0u8; data.read_u16::<LE>()? as usize];
        let mut comment_buf = vec![0u8; data.read_u16::<LE>()? as usize];

        if data.read_u16::<LE>()? != 0 {
            return Err(anyhow!("Multi-disk archives are not supported"));
        }

        let internal_attrs = data.read_u16::<LE>()?;
        let external_attrs = data.read_u32::<LE>()?;
        let local_header_offset = data.read_u32::<LE>()?;

        data.read_exact(&mut file_name_buf)?;
        data.read_exact(&mut extra_field_buf)?;
        data.read_exact(&mut comment_buf)?;

        Ok(Self {
            os_version_made_by: version_made_by,
            version_needed,
            flags,
            last_modified,
            crc32,
            compressed_len,
            uncompressed_len,
            internal_attrs,
            external_attrs,
            local_header_offset,

            file_name: String::from_utf8(file_name_buf).context("File name was not valid UTF-8")?,
            extra_field: extra_field_buf,
            comment: String::from_utf8(comment_buf).context("File comment was not valid UTF-8")?,
        })
    }

    pub fn write(&self, data: &mut impl Write) -> Result<()> {
        data.write_u32::<LE>(Self::HEADER)?;
        data.write_u16::<LE>(self.os_version_made_by)?;
        data.write_u16::<LE>(self.version_needed)?;
        data.write_u16::<LE>(self.flags)?;
        data.write_u16::<LE>(METHOD_STORE)?;
        data.write_u32::<LE>(self.last_modified)?;
        data.write_u32::<LE>(self.crc32)?;
        data.write_u32::<LE>(self.compressed_len)?;
        data.write_u32::<LE>(self.uncompressed_len)?;

        data.write_u16::<LE>(
            self.file_name
                .len()
                .try_into()
                .context("File name longer than max length")?,
        )?;
        data.write_u16::<LE>(
            self.extra_field
                .len()
                .try_into()
                .context("Extra field longer than max length")?,
        )?;
        data.write_u16::<LE>(
            self.comment
                .len()
                .try_into()
                .context("Comment longer than max length")?,
        )?;

        data.write_u16::<LE>(0)?; // Disk number
        data.write_u16::<LE>(self.internal_attrs)?;
        data.write_u32::<LE>(self.external_attrs)?;
        data.write_u32::<LE>(self.local_header_offset)?;

        data.write_all(self.file_name.as_bytes())?;
        data.write_all(&self.extra_field)?;
        data.write_all(self.comment.as_bytes())?;

        Ok(())
    }
}

impl LocalFileHeader {
    pub const HEADER: u32 = 0x04034b50;

    /// Serialized size: the fixed 30 bytes plus name and extra field.
    pub fn len(&self) -> usize {
        30 + self.file_name.len() + self.extra_field.len()
    }

    pub fn read(data: &mut impl Read) -> Result<Self> {
        if data.read_u32::<LE>()? != Self::HEADER {
            return Err(anyhow!("Invalid LFH header signature"));
        }

        let version_needed = data.read_u16::<LE>()?;
        let flags = data.read_u16::<LE>()?;
        if data.read_u16::<LE>()? != METHOD_STORE {
            return Err(anyhow!("Compressed entries are not supported"));
        }
        let last_modified = data.read_u32::<LE>()?;
        let crc32 = data.read_u32::<LE>()?;
        let compressed_len = data.read_u32::<LE>()?;
        let uncompressed_len = data.read_u32::<LE>()?;

        let mut file_name_buf = vec![0u8; data.read_u16::<LE>()? as usize];
        let mut extra_field_buf = vec![0u8; data.read_u16::<LE>()? as usize];

        data.read_exact(&mut file_name_buf)?;
        data.read_exact(&mut extra_field_buf)?;

        Ok(Self {
            version_needed,
            flags,
            last_modified,
            crc32,
            compressed_len,
            uncompressed_len,
            file_name: String::from_utf8(file_name_buf).context("File name was not valid UTF-8")?,
            extra_field: extra_field_buf,
        })
    }

    pub fn write(&self, data: &mut impl Write) -> Result<()> {
        data.write_u32::<LE>(Self::HEADER)?;
        data.write_u16::<LE>(self.version_needed)?;
        data.write_u16::<LE>(self.flags)?;
        data.write_u16::<LE>(METHOD_STORE)?;
        data.write_u32::<LE>(self.last_modified)?;
        data.write_u32::<LE>(self.crc32)?;
        data.write_u32::<LE>(self.compressed_len)?;
        data.write_u32::<LE>(self.uncompressed_len)?;

        data.write_u16::<LE>(
            self.file_name
                .len()
                .try_into()
                .context("File name longer than max length")?,
        )?;
        data.write_u16::<LE>(
            self.extra_field
                .len()
                .try_into()
                .context("Extra field longer than max length")?,
        )?;

        data.write_all(self.file_name.as_bytes())?;
        data.write_all(&self.extra_field)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn local_file_header_round_trips() {
        let header = LocalFileHeader {
            version_needed: VERSION_NEEDED_TO_EXTRACT,
            flags: 0,
            last_modified: 0,
            crc32: 0xdeadbeef,
            compressed_len: 42,
            uncompressed_len: 42,
            file_name: "lib/armeabi/libbasic.so".to_string(),
            extra_field: vec![0x35, 0xD9, 0x02, 0x00, 0x04, 0x00],
        };

        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), header.len());

        let parsed = LocalFileHeader::read(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed.file_name, header.file_name);
        assert_eq!(parsed.crc32, header.crc32);
        assert_eq!(parsed.extra_field, header.extra_field);
    }

    #[test]
    fn central_directory_round_trips() {
        let header = CentDirHeader {
            os_version_made_by: 0,
            version_needed: VERSION_NEEDED_TO_EXTRACT,
            flags: 0,
            last_modified: 0,
            crc32: 7,
            compressed_len: 3,
            uncompressed_len: 3,
            internal_attrs: 0,
            external_attrs: 0,
            local_header_offset: 128,
            file_name: "AndroidManifest.xml".to_string(),
            extra_field: Vec::new(),
            comment: String::new(),
        };

        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        let parsed = CentDirHeader::read(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed.file_name, header.file_name);
        assert_eq!(parsed.local_header_offset, 128);
    }

    #[test]
    fn eocd_round_trips() {
        let eocd = EndOfCentDir {
            cent_dir_records: 5,
            cent_dir_size: 310,
            cent_dir_offset: 2048,
            comment: Vec::new(),
        };

        let mut bytes = Vec::new();
        eocd.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), EndOfCentDir::MIN_SIZE);

        let parsed = EndOfCentDir::read(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed.cent_dir_records, 5);
        assert_eq!(parsed.cent_dir_offset, 2048);
    }
}
