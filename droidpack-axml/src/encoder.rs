//! Textual XML front end: drives an XML event stream into pooled chunks and
//! serializes the finished document.

use anyhow::{anyhow, Context, Result};
use byteorder::{WriteBytesExt, LE};
use std::{collections::HashMap, io::Read};
use xml::common::Position;
use xml::reader::XmlEvent;

use crate::res_ids::{config_changes_bits, resource_id, ANDROID_NS_URI};
use crate::string_pool::{StringPool, StringRef};
use crate::writer::{Attribute, AttributeValue, Chunk};
use crate::{write_chunk_header, ChunkType};

/// Compiles one well-formed UTF-8 XML document into Android binary XML.
///
/// On success the full serialized document is returned; on failure nothing is
/// emitted. Comments, processing instructions and CData sections are dropped,
/// and element text survives with its surrounding whitespace trimmed.
pub fn encode(input: impl Read) -> Result<Vec<u8>> {
    let mut compiler = Compiler::new();
    compiler.scan(input)?;
    compiler.serialize()
}

// A namespace declared by an element, remembered so the matching EndNamespace
// chunk can be emitted when that element closes. `previous` is the binding
// this declaration shadowed, restored on close.
struct PendingNamespace {
    prefix_key: String,
    previous: Option<String>,
    prefix: Option<StringRef>,
    uri: StringRef,
}

struct Compiler {
    pool: StringPool,
    chunks: Vec<Chunk>,
    // One entry per open element: the namespaces it declared (possibly none).
    declared: Vec<Vec<PendingNamespace>>,
    // Prefix to URI for every declaration currently in scope.
    active: HashMap<String, String>,
}

impl Compiler {
    fn new() -> Self {
        Self {
            pool: StringPool::new(),
            chunks: Vec::new(),
            declared: Vec::new(),
            active: HashMap::new(),
        }
    }

    fn scan(&mut self, input: impl Read) -> Result<()> {
        let mut reader = xml::EventReader::new(input);
        loop {
            let event = reader.next().context("Parsing XML document")?;
            let line = reader.position().row as u32 + 1;

            match event {
                XmlEvent::StartElement {
                    name,
                    attributes,
                    namespace,
                } => self.start_element(name, attributes, namespace, line)?,
                XmlEvent::EndElement { name } => self.end_element(name, line)?,
                XmlEvent::Characters(text) => self.text(&text, line)?,
                XmlEvent::EndDocument => break,
                // Whitespace, comments, processing instructions, CData and the
                // document prologue carry nothing the binary format keeps.
                _ => {}
            }
        }

        Ok(())
    }

    fn start_element(
        &mut self,
        name: xml::name::OwnedName,
        attributes: Vec<xml::attribute::OwnedAttribute>,
        namespace: xml::namespace::Namespace,
        line: u32,
    ) -> Result<()> {
        // The reader only exposes the namespaces in scope, not which ones this
        // element declared, so diff against the declarations already active.
        // The map's iteration order is unstable, so collect and sort by
        // prefix before emitting anything.
        let mut newly_declared: Vec<(&String, &String)> = namespace
            .0
            .iter()
            .filter(|&(prefix, uri)| {
                // The xml/xmlns prefixes are implied in binary XML.
                *prefix != "xml"
                    && *prefix != "xmlns"
                    && !uri.is_empty()
                    && self.active.get(prefix).map(String::as_str) != Some(uri.as_str())
            })
            .collect();
        newly_declared.sort_unstable();

        let mut declared = Vec::new();
        for (prefix, uri) in newly_declared {
            let prefix_ref = if prefix == xml::namespace::NS_NO_PREFIX {
                None
            } else {
                Some(self.pool.intern(prefix)?)
            };
            let uri_ref = self.pool.intern(uri)?;
            self.chunks.push(Chunk::StartNamespace {
                line,
                prefix: prefix_ref,
                uri: uri_ref,
            });
            let previous = self.active.insert(prefix.clone(), uri.clone());
            declared.push(PendingNamespace {
                prefix_key: prefix.clone(),
                previous,
                prefix: prefix_ref,
                uri: uri_ref,
            });
        }
        self.declared.push(declared);

        let mut attrs = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            let ns = attribute.name.namespace.as_deref();
            let local_name = &attribute.name.local_name;

            let value = self.typed_value(ns, local_name, &attribute.value, line)?;
            let namespace_ref = match &attribute.name.namespace {
                Some(uri) => Some(self.pool.intern(uri)?),
                None => None,
            };
            let id = if ns == Some(ANDROID_NS_URI) {
                resource_id(local_name)
            } else {
                None
            };
            attrs.push(Attribute {
                namespace: namespace_ref,
                name: self.pool.intern(local_name)?,
                resource_id: id,
                value,
            });
        }
        // Android resolves attributes through the resource map and expects
        // them ordered by resource ID; attributes without one go last.
        attrs.sort_by_key(|attr| attr.resource_id.unwrap_or(u32::MAX));

        let namespace_ref = self.element_namespace(&name)?;
        let name_ref = self.pool.intern(&name.local_name)?;
        self.chunks.push(Chunk::StartElement {
            line,
            namespace: namespace_ref,
            name: name_ref,
            attributes: attrs,
        });
        Ok(())
    }

    fn end_element(&mut self, name: xml::name::OwnedName, line: u32) -> Result<()> {
        let namespace_ref = self.element_namespace(&name)?;
        let name_ref = self.pool.intern(&name.local_name)?;
        self.chunks.push(Chunk::EndElement {
            line,
            namespace: namespace_ref,
            name: name_ref,
        });

        // Close this element's namespace declarations, innermost first.
        let declared = self
            .declared
            .pop()
            .ok_or_else(|| anyhow!("Unbalanced element close"))?;
        for pending in declared.into_iter().rev() {
            self.chunks.push(Chunk::EndNamespace {
                line,
                prefix: pending.prefix,
                uri: pending.uri,
            });
            // A declaration may have shadowed an outer binding of the same
            // prefix; put that binding back rather than dropping the prefix.
            match pending.previous {
                Some(uri) => self.active.insert(pending.prefix_key, uri),
                None => self.active.remove(&pending.prefix_key),
            };
        }
        Ok(())
    }

    fn text(&mut self, text: &str, line: u32) -> Result<()> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        // Text nodes keep the shape the SDK tooling gives them: surrounding
        // whitespace collapsed to a leading tab and a trailing newline.
        let text_ref = self.pool.intern(&format!("\t{trimmed}\n"))?;
        self.chunks.push(Chunk::Text {
            line,
            text: text_ref,
        });
        Ok(())
    }

    fn element_namespace(&mut self, name: &xml::name::OwnedName) -> Result<Option<StringRef>> {
        match &name.namespace {
            Some(uri) if !uri.is_empty() => Ok(Some(self.pool.intern(uri)?)),
            _ => Ok(None),
        }
    }

    // Classifies an attribute value. Inside the android namespace a handful of
    // attributes carry primitives instead of strings; everything else is a
    // string reference.
    fn typed_value(
        &mut self,
        namespace: Option<&str>,
        local_name: &str,
        raw: &str,
        line: u32,
    ) -> Result<AttributeValue> {
        if namespace == Some(ANDROID_NS_URI) {
            match local_name {
                "versionCode" | "minSdkVersion" => {
                    let parsed = raw.parse::<i32>().with_context(|| {
                        format!(
                            "line {line}: attribute `{local_name}` expects a decimal integer, got `{raw}`"
                        )
                    })?;
                    return Ok(AttributeValue::IntDec(parsed));
                }
                "hasCode" | "debuggable" => {
                    let parsed = match raw {
                        "true" => true,
                        "false" => false,
                        other => {
                            return Err(anyhow!(
                                "line {line}: attribute `{local_name}` expects `true` or `false`, got `{other}`"
                            ))
                        }
                    };
                    return Ok(AttributeValue::Boolean(parsed));
                }
                "configChanges" => {
                    return Ok(AttributeValue::Flags(config_changes_bits(raw)));
                }
                _ => {}
            }
        }

        Ok(AttributeValue::String(self.pool.intern(raw)?))
    }

    fn serialize(mut self) -> Result<Vec<u8>> {
        self.pool.sort();

        let mut pool_bytes = Vec::new();
        self.pool.serialize(&mut pool_bytes)?;

        let mut body = Vec::new();
        for chunk in &self.chunks {
            chunk.serialize(&self.pool, &mut body)?;
        }

        // The resource map parallels the string pool: the attribute resource
        // ID for entries that are mapped attribute names, zero otherwise.
        let res_map_payload: u32 = (4 * self.pool.len())
            .try_into()
            .context("String pool too large")?;

        let total_len = 8 + pool_bytes.len() + 8 + res_map_payload as usize + body.len();
        let mut out = Vec::with_capacity(total_len);
        write_chunk_header(
            &mut out,
            ChunkType::Xml,
            (total_len - 8).try_into().context("Document too large")?,
        )?;
        out.extend_from_slice(&pool_bytes);
        write_chunk_header(&mut out, ChunkType::XmlResourceMap, res_map_payload)?;
        for s in self.pool.strings() {
            out.write_u32::<LE>(resource_id(s).unwrap_or(0))?;
        }
        out.extend_from_slice(&body);

        Ok(out)
    }
}
