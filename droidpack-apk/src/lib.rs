//! Streaming writer for signed Android application packages.
//!
//! An APK is a ZIP archive with two extra constraints and three extra files.
//! The constraints: entries are stored uncompressed, and each entry's data
//! begins at a 4-byte-aligned offset so Android can map it straight into
//! memory. The files: `META-INF/MANIFEST.MF` (per-entry SHA-1 digests),
//! `META-INF/CERT.SF` (digests of the manifest blocks) and
//! `META-INF/CERT.RSA` (a PKCS#7 RSA signature over CERT.SF), which together
//! form the v1 JAR signature Android's installer checks.
//!
//! ```no_run
//! use std::io::Write;
//! # fn demo(key: rsa::RsaPrivateKey) -> anyhow::Result<()> {
//! let mut apk = droidpack_apk::ApkWriter::new(std::fs::File::create("out.apk")?, key);
//! apk.create("AndroidManifest.xml")?.write_all(b"...")?;
//! apk.create("lib/armeabi/libbasic.so")?.write_all(b"...")?;
//! apk.close()?;
//! # Ok(())
//! # }
//! ```

use std::io::{self, Write};

use anyhow::{anyhow, Context, Result};
use crc::{Algorithm, Crc};
use log::{debug, info};
use rsa::RsaPrivateKey;
use sha1::{Digest, Sha1};

use self::data::{CentDirHeader, EndOfCentDir, LocalFileHeader, VERSION_NEEDED_TO_EXTRACT};
use self::manifest::ManifestEntry;

pub mod data;
mod manifest;
pub mod signing;

/// The CRC-32 algorithm used by the ZIP file format.
pub const ZIP_CRC: Crc<u32> = Crc::<u32>::new(&Algorithm {
    width: 32,
    poly: 0x04c11db7,
    init: 0xffffffff,
    refin: true,
    refout: true,
    xorout: 0xffffffff,
    check: 0xcbf43926,
    residue: 0xdebb20e3,
});

/// Calculates the CRC-32 hash of a slice, using the same algorithm as ZIP.
pub fn crc_bytes(bytes: &[u8]) -> u32 {
    let mut digest = ZIP_CRC.digest();
    digest.update(bytes);
    digest.finalize()
}

// Alignment of entry data within the archive. Android mmaps stored entries,
// so their data must start on a 4-byte boundary.
const STORE_ALIGNMENT: u64 = 4;

/// Writes a signed APK to a byte sink.
///
/// Entries are added with [`create`](Self::create) and finalized by the next
/// `create` or by [`close`](Self::close), which also emits the `META-INF`
/// signing files, the central directory and the end-of-central-directory
/// record. Entries appear in the archive, in MANIFEST.MF and in CERT.SF in
/// creation order. After any error the writer refuses further work.
#[derive(Debug)]
pub struct ApkWriter<W: Write> {
    sink: W,
    key: RsaPrivateKey,
    offset: u64,
    entries: Vec<CentDirHeader>,
    manifest: Vec<ManifestEntry>,
    current: Option<PendingEntry>,
    poisoned: bool,
}

#[derive(Debug)]
struct PendingEntry {
    name: String,
    sha1: Sha1,
    data: Vec<u8>,
}

/// Byte sink for one archive entry, returned by [`ApkWriter::create`].
/// Writing feeds both the entry and its running SHA-1 digest.
#[derive(Debug)]
pub struct EntryWriter<'a, W: Write> {
    apk: &'a mut ApkWriter<W>,
}

impl<W: Write> Write for EntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.apk.current.as_mut() {
            Some(entry) => {
                entry.sha1.update(buf);
                entry.data.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "no archive entry is open",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write> ApkWriter<W> {
    /// Creates a writer that signs with `key` on close. The sink is owned by
    /// the writer until then.
    pub fn new(sink: W, key: RsaPrivateKey) -> Self {
        Self {
            sink,
            key,
            offset: 0,
            entries: Vec::new(),
            manifest: Vec::new(),
            current: None,
            poisoned: false,
        }
    }

    /// Finalizes any in-progress entry and opens a new one named `name`.
    /// The entry is stored uncompressed with its data 4-byte aligned.
    pub fn create(&mut self, name: &str) -> Result<EntryWriter<'_, W>> {
        self.check_usable()?;
        if let Err(err) = self.finish_current() {
            self.poisoned = true;
            return Err(err);
        }

        self.current = Some(PendingEntry {
            name: name.to_string(),
            sha1: Sha1::new(),
            data: Vec::new(),
        });
        Ok(EntryWriter { apk: self })
    }

    /// Finalizes the archive: emits the three `META-INF` signing files, the
    /// central directory and the end-of-central-directory record, then
    /// flushes the sink.
    pub fn close(mut self) -> Result<()> {
        self.check_usable()?;
        self.finish_current()?;

        info!("signing archive with {} entries", self.manifest.len());
        let manifest_bytes = manifest::manifest_file(&self.manifest);
        let sf_bytes = manifest::signature_file(&self.manifest, &manifest_bytes);
        let cert = signing::self_signed_certificate(&self.key)?;
        let pkcs7 = signing::sign_signature_file(&sf_bytes, &self.key, &cert)
            .context("Signing CERT.SF")?;

        // The signing files are ordinary aligned entries; they are not
        // themselves listed in MANIFEST.MF.
        self.write_store_entry("META-INF/MANIFEST.MF", &manifest_bytes)?;
        self.write_store_entry("META-INF/CERT.SF", &sf_bytes)?;
        self.write_store_entry("META-INF/CERT.RSA", &pkcs7)?;

        let cd_offset = self.offset;
        let mut cd_bytes = Vec::new();
        for header in &self.entries {
            header.write(&mut cd_bytes)?;
        }
        self.sink.write_all(&cd_bytes)?;

        let eocd = EndOfCentDir {
            cent_dir_records: self
                .entries
                .len()
                .try_into()
                .context("Too many ZIP entries")?,
            cent_dir_size: cd_bytes
                .len()
                .try_into()
                .context("Central directory too big")?,
            cent_dir_offset: cd_offset.try_into().context("ZIP file too large")?,
            comment: Vec::new(),
        };
        eocd.write(&mut self.sink)?;
        self.sink.flush()?;

        Ok(())
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            Err(anyhow!("APK writer is unusable after a previous error"))
        } else {
            Ok(())
        }
    }

    // Writes out the buffered entry, if one is open, and records its digest
    // for MANIFEST.MF.
    fn finish_current(&mut self) -> Result<()> {
        let Some(entry) = self.current.take() else {
            return Ok(());
        };

        let digest: [u8; 20] = entry.sha1.finalize().into();
        self.write_store_entry(&entry.name, &entry.data)?;
        self.manifest.push(ManifestEntry {
            name: entry.name,
            digest,
        });
        Ok(())
    }

    // Emits one stored, aligned entry: local file header, alignment extra
    // field, data. Also queues the matching central directory record.
    fn write_store_entry(&mut self, name: &str, contents: &[u8]) -> Result<()> {
        let crc32 = crc_bytes(contents);
        let lfh_offset = self.offset;
        // Where the data would land with an empty extra field.
        let unaligned_data_offset = lfh_offset + 30 + name.len() as u64;
        let extra_field = alignment_field(unaligned_data_offset)?;

        let contents_len: u32 = contents
            .len()
            .try_into()
            .context("Entry too large for 32-bit ZIP file")?;
        let header = LocalFileHeader {
            version_needed: VERSION_NEEDED_TO_EXTRACT,
            flags: 0,
            last_modified: 0,
            crc32,
            compressed_len: contents_len,
            uncompressed_len: contents_len,
            file_name: name.to_string(),
            extra_field,
        };

        header.write(&mut self.sink).context("Writing local file header")?;
        self.sink.write_all(contents).context("Writing file data")?;

        let data_offset = lfh_offset + header.len() as u64;
        debug_assert_eq!(data_offset % STORE_ALIGNMENT, 0);
        self.offset = data_offset + contents.len() as u64;

        self.entries.push(CentDirHeader {
            os_version_made_by: 0,
            version_needed: VERSION_NEEDED_TO_EXTRACT,
            flags: 0,
            last_modified: 0,
            crc32,
            compressed_len: contents_len,
            uncompressed_len: contents_len,
            internal_attrs: 0,
            external_attrs: 0,
            local_header_offset: lfh_offset.try_into().context("ZIP file too large")?,
            file_name: name.to_string(),
            extra_field: Vec::new(),
            comment: String::new(),
        });

        debug!("added entry {name} ({} bytes)", contents.len());
        Ok(())
    }
}

const ALIGNMENT_EXTRA_DATA_HEADER: u16 = 0xD935;

// Builds the extra field that pads the entry data out to STORE_ALIGNMENT.
// `data_offset` is what the offset of the first data byte would be with no
// extra field. Returns an empty field when already aligned.
fn alignment_field(data_offset: u64) -> Result<Vec<u8>> {
    use byteorder::{WriteBytesExt, LE};

    if data_offset % STORE_ALIGNMENT == 0 {
        return Ok(Vec::new());
    }

    // The field is 6 bytes (extra data ID, data length, alignment level)
    // followed by however many zero bytes reach the alignment.
    let after_min_len = data_offset + 6;
    let padding_bytes =
        (STORE_ALIGNMENT - after_min_len % STORE_ALIGNMENT) % STORE_ALIGNMENT;

    let mut field = Vec::with_capacity(6 + padding_bytes as usize);
    field.write_u16::<LE>(ALIGNMENT_EXTRA_DATA_HEADER)?;
    field.write_u16::<LE>((padding_bytes + 2) as u16)?;
    field.write_u16::<LE>(STORE_ALIGNMENT as u16)?;
    for _ in 0..padding_bytes {
        field.write_u8(0)?;
    }

    Ok(field)
}
