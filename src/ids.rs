//! Content-derived identifiers.
//!
//! Every identifier is a lowercase hex SHA-256 digest computed from
//! content and position only, so importing the same file twice yields the
//! same identifiers regardless of database-assigned keys.

use sha2::{Digest, Sha256};

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Digest of raw file content, used to detect unchanged files on reimport.
pub fn content_hash(bytes: &[u8]) -> String {
    sha256_hex(bytes)
}

/// Identifier of a finding aid from its import name (file base name, or
/// declared `eadid` when there is no file).
pub fn root_stable_id(import_name: &str) -> String {
    sha256_hex(import_name.as_bytes())
}

/// Identifier of a component: root identifier followed by the dash-joined
/// sibling path, e.g. `<root>0-2-1`.
pub fn component_stable_id(root_id: &str, path: &[usize]) -> String {
    sha256_hex(format!("{}{}", root_id, path_key(path)).as_bytes())
}

/// Dash-joined decimal form of a component path.
pub fn path_key(path: &[usize]) -> String {
    path.iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identifiers_are_reproducible() {
        assert_eq!(root_stable_id("FRAD001_1.xml"), root_stable_id("FRAD001_1.xml"));
        let root = root_stable_id("FRAD001_1.xml");
        assert_eq!(
            component_stable_id(&root, &[0, 2]),
            component_stable_id(&root, &[0, 2])
        );
        assert_eq!(root.len(), 64);
    }

    #[test]
    fn paths_do_not_collide() {
        let root = root_stable_id("FRAD001_1.xml");
        let paths: Vec<Vec<usize>> = vec![
            vec![0],
            vec![1],
            vec![0, 1],
            vec![1, 0],
            vec![0, 11],
            vec![0, 1, 1],
            vec![11],
        ];
        let mut ids: HashSet<String> = paths
            .iter()
            .map(|p| component_stable_id(&root, p))
            .collect();
        ids.insert(root.clone());
        assert_eq!(ids.len(), paths.len() + 1);
    }

    #[test]
    fn path_key_format() {
        assert_eq!(path_key(&[0]), "0");
        assert_eq!(path_key(&[3, 0, 12]), "3-0-12");
    }
}
