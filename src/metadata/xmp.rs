//! Read-only XMP support for JPEG APP1 packets.
//!
//! Only the Dublin Core fields that map onto photo metadata are extracted:
//! `dc:subject` (keyword bag) and `dc:description` (language alternative,
//! `x-default` preferred). Extended XMP split across several segments is
//! not reassembled.

use super::iptc::{self, APP1};
use super::normalize_tags;
use roxmltree::{Document, Node};
use thiserror::Error;

const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Error, Debug)]
pub enum XmpError {
    #[error("XMP packet is not UTF-8")]
    NotUtf8,
    #[error("invalid XMP packet: {0}")]
    Xml(#[from] roxmltree::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmpData {
    pub keywords: Vec<String>,
    pub description: Option<String>,
}

/// Extract Dublin Core keywords and description. No packet reads as empty.
pub fn read_xmp(jpeg: &[u8]) -> Result<XmpData, XmpError> {
    let Some(packet) = find_packet(jpeg) else {
        return Ok(XmpData::default());
    };
    let text = std::str::from_utf8(packet).map_err(|_| XmpError::NotUtf8)?;
    parse_packet(text)
}

fn find_packet(jpeg: &[u8]) -> Option<&[u8]> {
    iptc::segment_payloads(jpeg, APP1)
        .ok()?
        .into_iter()
        .find_map(|payload| payload.strip_prefix(XMP_HEADER))
}

fn parse_packet(text: &str) -> Result<XmpData, XmpError> {
    // Writers pad packets with whitespace and sometimes NULs
    let doc = Document::parse(text.trim_end_matches(|c: char| c == '\0' || c.is_whitespace()))?;

    let keywords = normalize_tags(
        doc.descendants()
            .filter(|n| n.has_tag_name((DC_NS, "subject")))
            .flat_map(list_items),
    );
    let description = doc
        .descendants()
        .find(|n| n.has_tag_name((DC_NS, "description")))
        .and_then(default_language);

    Ok(XmpData {
        keywords,
        description,
    })
}

fn items<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.descendants().filter(|n| n.has_tag_name((RDF_NS, "li")))
}

fn list_items(node: Node<'_, '_>) -> Vec<String> {
    items(node)
        .filter_map(|li| li.text())
        .map(str::to_string)
        .collect()
}

/// The `x-default` entry of a language alternative, else the first one.
/// A plain-text element (no `rdf:Alt`) is read as is.
fn default_language(node: Node<'_, '_>) -> Option<String> {
    let alternatives: Vec<Node<'_, '_>> = items(node).collect();
    let text = match alternatives
        .iter()
        .find(|li| li.attribute((XML_NS, "lang")) == Some("x-default"))
        .or(alternatives.first())
    {
        Some(li) => li.text(),
        None => node.text(),
    };
    text.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{encode_jpeg, gradient, insert_app1};

    const PACKET: &str = r#"<?xpacket begin="﻿" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about="" xmlns:dc="http://purl.org/dc/elements/1.1/">
   <dc:subject>
    <rdf:Bag>
     <rdf:li>lion</rdf:li>
     <rdf:li> savanna </rdf:li>
     <rdf:li>lion</rdf:li>
    </rdf:Bag>
   </dc:subject>
   <dc:description>
    <rdf:Alt>
     <rdf:li xml:lang="fr-FR">Lionne au crépuscule</rdf:li>
     <rdf:li xml:lang="x-default">Lioness at dusk</rdf:li>
    </rdf:Alt>
   </dc:description>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#;

    #[test]
    fn parses_subject_bag_and_default_description() {
        let xmp = parse_packet(PACKET).unwrap();
        assert_eq!(xmp.keywords, vec!["lion", "savanna"]);
        assert_eq!(xmp.description.as_deref(), Some("Lioness at dusk"));
    }

    #[test]
    fn description_without_default_uses_first_entry() {
        let packet = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
            xmlns:dc="http://purl.org/dc/elements/1.1/">
          <rdf:Description>
            <dc:description><rdf:Alt><rdf:li xml:lang="en">Herd</rdf:li></rdf:Alt></dc:description>
          </rdf:Description>
        </rdf:RDF>"#;
        let xmp = parse_packet(packet).unwrap();
        assert_eq!(xmp.description.as_deref(), Some("Herd"));
        assert!(xmp.keywords.is_empty());
    }

    #[test]
    fn reads_packet_from_jpeg() {
        let mut payload = XMP_HEADER.to_vec();
        payload.extend_from_slice(PACKET.as_bytes());
        payload.extend_from_slice(&[b' '; 64]);
        let jpeg = insert_app1(&encode_jpeg(&gradient(8, 8)), &payload);

        let xmp = read_xmp(&jpeg).unwrap();
        assert_eq!(xmp.keywords, vec!["lion", "savanna"]);
    }

    #[test]
    fn jpeg_without_packet_is_empty() {
        assert_eq!(read_xmp(&encode_jpeg(&gradient(8, 8))).unwrap(), XmpData::default());
    }

    #[test]
    fn broken_packet_is_an_error() {
        assert!(matches!(parse_packet("<x:xmpmeta"), Err(XmpError::Xml(_))));
    }
}
