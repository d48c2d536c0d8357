//! JAR-style signing metadata: MANIFEST.MF and CERT.SF rendering.
//!
//! Both files are sequences of attribute blocks with CRLF line endings and a
//! blank line after each block. The per-entry digests in CERT.SF cover the
//! corresponding MANIFEST.MF block including its trailing blank line, which
//! is what Android's v1 verifier recomputes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::{Digest, Sha1};

const CREATED_BY: &str = "1.0 (Android)";

/// One archive entry as it appears in MANIFEST.MF: name plus the SHA-1 of the
/// entry's uncompressed bytes.
#[derive(Debug)]
pub(crate) struct ManifestEntry {
    pub name: String,
    pub digest: [u8; 20],
}

/// Renders the full MANIFEST.MF for the given entries, in order.
pub(crate) fn manifest_file(entries: &[ManifestEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"Manifest-Version: 1.0\r\n");
    out.extend_from_slice(format!("Created-By: {CREATED_BY}\r\n\r\n").as_bytes());
    for entry in entries {
        out.extend_from_slice(&entry_block(entry));
    }
    out
}

/// Renders CERT.SF against the exact MANIFEST.MF bytes being signed.
pub(crate) fn signature_file(entries: &[ManifestEntry], manifest: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"Signature-Version: 1.0\r\n");
    out.extend_from_slice(format!("Created-By: {CREATED_BY}\r\n").as_bytes());
    out.extend_from_slice(
        format!(
            "SHA1-Digest-Manifest: {}\r\n\r\n",
            BASE64.encode(Sha1::digest(manifest))
        )
        .as_bytes(),
    );

    for entry in entries {
        let block = entry_block(entry);
        out.extend_from_slice(
            format!(
                "Name: {}\r\nSHA1-Digest: {}\r\n\r\n",
                entry.name,
                BASE64.encode(Sha1::digest(&block))
            )
            .as_bytes(),
        );
    }
    out
}

fn entry_block(entry: &ManifestEntry) -> Vec<u8> {
    format!(
        "Name: {}\r\nSHA1-Digest: {}\r\n\r\n",
        entry.name,
        BASE64.encode(entry.digest)
    )
    .into_bytes()
}
