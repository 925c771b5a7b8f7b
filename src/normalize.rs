//! Canonicalisation of a freshly parsed finding aid.
//!
//! Two rewrites, applied in place:
//!
//! - namespace prefixes are dropped from element and attribute names
//!   (`ead:c` → `c`, `xlink:href` → `href`) and namespace declarations are
//!   removed, so every later stage matches on local names;
//! - elements flagged `audience="internal"` are detached with their subtree.

use crate::error::ImportError;
use crate::xml::XmlTree;

const INTERNAL_AUDIENCE: &str = "internal";

fn local_name(name: &str) -> &str {
    match name.rsplit_once(':') {
        Some((_, local)) => local,
        None => name,
    }
}

fn is_namespace_declaration(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

/// Strip namespace prefixes from every element and attribute.
pub fn strip_namespaces(tree: &mut XmlTree) {
    for id in tree.element_ids() {
        if let Some(element) = tree.element_mut(id) {
            element.name = local_name(&element.name).to_string();
            element.attrs.retain(|(k, _)| !is_namespace_declaration(k));
            for (key, _) in element.attrs.iter_mut() {
                *key = local_name(key).to_string();
            }
        }
    }
}

/// Detach every element whose `audience` attribute is `internal`.
///
/// Returns the number of removed subtrees.
pub fn remove_internal(tree: &mut XmlTree) -> usize {
    let flagged: Vec<_> = tree
        .element_ids()
        .into_iter()
        .filter(|&id| {
            tree.node(id)
                .attr("audience")
                .map(|a| a.trim().eq_ignore_ascii_case(INTERNAL_AUDIENCE))
                .unwrap_or(false)
        })
        .collect();
    // nested flagged nodes go away with their ancestor; detaching twice is harmless
    for &id in &flagged {
        tree.detach(id);
    }
    flagged.len()
}

/// Parse raw bytes and apply both rewrites.
pub fn preprocess(bytes: &[u8]) -> Result<XmlTree, ImportError> {
    let mut tree = XmlTree::parse_bytes(bytes)?;
    strip_namespaces(&mut tree);
    let removed = remove_internal(&mut tree);
    if removed > 0 {
        tracing::debug!(removed, "dropped internal-only elements");
    }
    if tree.root().is_none() {
        return Err(ImportError::InvalidFindingAid(
            "root element is internal-only".to_string(),
        ));
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_element_and_attribute_prefixes() {
        let xml = r#"<ead:ead xmlns:ead="urn:isbn:1-931666-22-9" xmlns:xlink="http://www.w3.org/1999/xlink">
            <ead:archdesc><ead:dao xlink:href="a.jpg" xlink:role="image"/></ead:archdesc></ead:ead>"#;
        let tree = preprocess(xml.as_bytes()).unwrap();
        let root = tree.root().unwrap();
        assert_eq!(root.tag(), "ead");
        assert!(root.attr("xmlns:ead").is_none());
        assert!(root.attr("ead").is_none());
        let dao = root.select_first("archdesc/dao").unwrap();
        assert_eq!(dao.attr("href"), Some("a.jpg"));
        assert_eq!(dao.attr("role"), Some("image"));
    }

    #[test]
    fn removes_internal_subtrees() {
        let xml = r#"<ead><archdesc>
            <did><unittitle>Public</unittitle></did>
            <processinfo audience="internal"><p>secret <note audience="internal">x</note></p></processinfo>
            <scopecontent audience="external"><p>visible</p></scopecontent>
        </archdesc></ead>"#;
        let tree = preprocess(xml.as_bytes()).unwrap();
        let archdesc = tree.root().unwrap().child("archdesc").unwrap();
        assert!(archdesc.child("processinfo").is_none());
        assert!(archdesc.select("//note").is_empty());
        assert!(archdesc.child("scopecontent").is_some());
    }

    #[test]
    fn internal_root_is_rejected() {
        let xml = r#"<ead audience="internal"><archdesc/></ead>"#;
        assert!(matches!(
            preprocess(xml.as_bytes()),
            Err(ImportError::InvalidFindingAid(_))
        ));
    }
}
