use sha2::{Digest, Sha256};

use crate::docs::types::{CitationMap, SourceDocument, TaggedDocument};

/// Hex characters kept from the source hash.
pub const TAG_LEN: usize = 7;

/// Short stable citation tag for a source URL: the first seven hex
/// characters of its SHA-256.
pub fn source_tag(source_id: &str) -> String {
    let digest = Sha256::digest(source_id.as_bytes());
    let mut hex = String::with_capacity(TAG_LEN + 1);
    for byte in digest.iter().take(TAG_LEN.div_ceil(2)) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex.truncate(TAG_LEN);
    hex
}

/// The inline marker form of a tag, `[tag]`.
pub fn marker(tag: &str) -> String {
    format!("[{}]", tag)
}

/// Append a citation marker to `text`.
pub fn tag_text(text: &str, tag: &str) -> String {
    format!("{}{}", text, marker(tag))
}

/// Tag a document with the hash of its source URL. The input is left untouched.
pub fn tag_document(doc: &SourceDocument) -> TaggedDocument {
    let tag = source_tag(&doc.source_id);
    TaggedDocument {
        text: tag_text(&doc.text, &tag),
        source_id: doc.source_id.clone(),
        tag,
    }
}

/// Rewrite `[tag]` markers found in `text` into numbered markdown links.
///
/// Numbers start at 1 and are assigned once per distinct marker, in the order
/// markers first appear in the text; every occurrence of a marker gets the
/// same number. Returns the rewritten text and the subset of `citations`
/// that was actually used, in numbering order. Markers not in `citations`
/// are left alone.
///
/// Numbering follows first appearance in the text rather than map order.
pub fn rewrite_citations(text: &str, citations: &CitationMap) -> (String, CitationMap) {
    let mut used = CitationMap::new();
    let mut numbers: Vec<&str> = Vec::new();
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let candidate = &rest[open..];

        let hit = citations
            .iter()
            .filter(|(m, _)| candidate.starts_with(m))
            .max_by_key(|(m, _)| m.len());

        match hit {
            Some((m, url)) => {
                let n = match numbers.iter().position(|known| *known == m) {
                    Some(idx) => idx + 1,
                    None => {
                        numbers.push(m);
                        used.insert(m, url);
                        numbers.len()
                    }
                };
                out.push_str(&format!("[[{}]]({})", n, url));
                rest = &candidate[m.len()..];
            }
            None => {
                out.push('[');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);

    (out, used)
}
