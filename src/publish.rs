//! Republication of the cleaned XML of each imported finding aid.
//!
//! The normalized tree is rendered while the file is imported and written
//! under `{artifacts_dir}/ape-ead/{service_code}/ape-{basename}` only once
//! its records are committed. Failing to render or write it never fails the
//! import; the caller logs and carries on.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::ImportError;
use crate::xml::XmlTree;

/// Serialized artifact waiting for its records to be committed.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Path relative to the artifacts directory.
    pub relpath: PathBuf,
    pub bytes: Vec<u8>,
}

/// Artifact path relative to the artifacts directory.
pub fn artifact_relpath(service_code: &str, basename: &str) -> PathBuf {
    let mut file_name = format!("ape-{}", basename);
    if !file_name.to_lowercase().ends_with(".xml") {
        file_name.push_str(".xml");
    }
    Path::new("ape-ead").join(service_code).join(file_name)
}

pub fn render_artifact(
    service_code: &str,
    basename: &str,
    tree: &XmlTree,
) -> Result<Artifact, ImportError> {
    Ok(Artifact {
        relpath: artifact_relpath(service_code, basename),
        bytes: tree.to_xml_bytes()?,
    })
}

/// Write `artifact` below `artifacts_dir` and return the absolute target.
pub async fn write_artifact(artifacts_dir: &Path, artifact: &Artifact) -> Result<PathBuf> {
    let target = artifacts_dir.join(&artifact.relpath);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    tokio::fs::write(&target, &artifact.bytes)
        .await
        .with_context(|| format!("writing {}", target.display()))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn relpath_appends_xml_once() {
        assert_eq!(
            artifact_relpath("FRAD054", "FRAD054_IR_1.xml"),
            PathBuf::from("ape-ead/FRAD054/ape-FRAD054_IR_1.xml")
        );
        assert_eq!(
            artifact_relpath("FRAD054", "FRAD054_IR_1"),
            PathBuf::from("ape-ead/FRAD054/ape-FRAD054_IR_1.xml")
        );
    }

    #[tokio::test]
    async fn writes_serialized_tree() {
        let tmp = TempDir::new().unwrap();
        let tree = XmlTree::parse_str("<ead><eadheader/></ead>").unwrap();
        let artifact = render_artifact("FRAD054", "a.xml", &tree).unwrap();
        let target = write_artifact(tmp.path(), &artifact).await.unwrap();
        assert_eq!(target, tmp.path().join("ape-ead/FRAD054/ape-a.xml"));
        let written = std::fs::read_to_string(target).unwrap();
        assert!(written.contains("<eadheader"));
    }

    #[tokio::test]
    async fn unwritable_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let tree = XmlTree::parse_str("<ead/>").unwrap();
        let artifact = render_artifact("FRAD054", "a.xml", &tree).unwrap();
        assert!(write_artifact(&blocker, &artifact).await.is_err());
    }
}
