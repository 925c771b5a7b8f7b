//! Tree walker over a normalized finding aid.
//!
//! [`FindingAidReader::components`] descends the `dsc` hierarchy depth-first
//! in pre-order. Each component's identity is merged with its parent's
//! already-resolved identity by [`inherit_identity`], and ancestor index
//! entries are merged in variant-preserving mode. A component without a
//! `did` is logged and skipped together with its subtree; its sibling
//! index is still consumed so the paths of later siblings do not move.

use crate::dao::{DaoResolver, DigitizedVersion};
use crate::error::ImportError;
use crate::extract::{descriptive_text, did_infos, header_infos, DescriptiveText, HeaderInfo, Identity};
use crate::index_entries::{
    collect_index_entries, collect_origination, merge_inherited, IndexEntry, Level,
};
use crate::xml::{Node, XmlTree};

/// Element names of hierarchy levels: the generic `c` and `c01`..`c12`.
pub const COMPONENT_TAGS: [&str; 13] = [
    "c", "c01", "c02", "c03", "c04", "c05", "c06", "c07", "c08", "c09", "c10", "c11", "c12",
];

pub fn is_component(node: &Node<'_>) -> bool {
    COMPONENT_TAGS.contains(&node.tag())
}

/// Fields read from `archdesc`.
#[derive(Debug, Clone)]
pub struct RootProps {
    pub fatype: Option<String>,
    pub identity: Identity,
    pub text: DescriptiveText,
    pub origination: Vec<IndexEntry>,
    pub index_entries: Vec<IndexEntry>,
    pub daos: Vec<DigitizedVersion>,
}

/// One component, with inheritance already applied.
#[derive(Debug, Clone)]
pub struct ComponentNode {
    pub path: Vec<usize>,
    pub component_id: Option<String>,
    pub identity: Identity,
    pub text: DescriptiveText,
    pub origination: Vec<IndexEntry>,
    /// Own entries merged with every ancestor's (variant-preserving).
    pub index_entries: Vec<IndexEntry>,
    pub daos: Vec<DigitizedVersion>,
}

/// What a node passes down to its children.
#[derive(Debug, Clone, Default)]
struct Inherited {
    identity: Identity,
    index_entries: Vec<IndexEntry>,
}

/// Fill unset title, date range and unit identifier from the parent.
pub fn inherit_identity(mut own: Identity, parent: &Identity) -> Identity {
    if own.title.is_none() {
        own.title = parent.title.clone();
    }
    if own.dates.is_empty() {
        own.dates = parent.dates;
        if own.date_label.is_none() {
            own.date_label = parent.date_label.clone();
        }
    }
    if own.unitid.is_none() {
        own.unitid = parent.unitid.clone();
    }
    own
}

pub struct FindingAidReader<'t> {
    root: Node<'t>,
    archdesc: Node<'t>,
    resolver: &'t DaoResolver,
}

impl<'t> FindingAidReader<'t> {
    /// Fails when the document has no `archdesc` or no `archdesc/did`.
    pub fn new(tree: &'t XmlTree, resolver: &'t DaoResolver) -> Result<Self, ImportError> {
        let root = tree
            .root()
            .ok_or_else(|| ImportError::InvalidFindingAid("empty document".to_string()))?;
        let archdesc = root
            .child("archdesc")
            .ok_or_else(|| ImportError::InvalidFindingAid("no archdesc found".to_string()))?;
        if archdesc.child("did").is_none() {
            return Err(ImportError::InvalidFindingAid(
                "archdesc has no did".to_string(),
            ));
        }
        Ok(FindingAidReader {
            root,
            archdesc,
            resolver,
        })
    }

    pub fn header(&self) -> HeaderInfo {
        header_infos(&self.root)
    }

    pub fn root_props(&self) -> RootProps {
        let identity = self
            .archdesc
            .child("did")
            .map(|did| did_infos(&did, self.archdesc.attr("id")))
            .unwrap_or_default();
        RootProps {
            fatype: self.archdesc.attr_nonempty("type").map(str::to_string),
            identity,
            text: descriptive_text(&self.archdesc),
            origination: collect_origination(&self.archdesc),
            index_entries: collect_index_entries(&self.archdesc, Level::Root),
            daos: self.resolver.component_daos(&self.archdesc),
        }
    }

    /// Every valid component in depth-first pre-order.
    pub fn components(&self, root: &RootProps) -> Vec<ComponentNode> {
        let inherited = Inherited {
            identity: root.identity.clone(),
            index_entries: root.index_entries.clone(),
        };
        let top_level: Vec<Node<'t>> = self
            .archdesc
            .select("dsc")
            .iter()
            .flat_map(|dsc| dsc.elements().filter(is_component).collect::<Vec<_>>())
            .collect();

        let mut out = Vec::new();
        self.walk(&top_level, &[], &inherited, &mut out);
        out
    }

    fn walk(
        &self,
        siblings: &[Node<'t>],
        parent_path: &[usize],
        parent: &Inherited,
        out: &mut Vec<ComponentNode>,
    ) {
        for (idx, node) in siblings.iter().enumerate() {
            let mut path = parent_path.to_vec();
            path.push(idx);

            let Some(did) = node.child("did") else {
                tracing::warn!(
                    path = ?path,
                    tag = node.tag(),
                    "component without did skipped with its subtree"
                );
                continue;
            };

            let component_id = node.attr_nonempty("id").map(str::to_string);
            let identity = inherit_identity(
                did_infos(&did, component_id.as_deref()),
                &parent.identity,
            );
            let index_entries = merge_inherited(
                &parent.index_entries,
                collect_index_entries(node, Level::Component),
            );

            let inherited = Inherited {
                identity: identity.clone(),
                index_entries: index_entries.clone(),
            };
            out.push(ComponentNode {
                path: path.clone(),
                component_id,
                identity,
                text: descriptive_text(node),
                origination: collect_origination(node),
                index_entries,
                daos: self.resolver.component_daos(node),
            });

            let children: Vec<Node<'t>> = node.elements().filter(is_component).collect();
            self.walk(&children, &path, &inherited, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::YearRange;

    const FA: &str = r#"<ead><eadheader><eadid>FRAD001_IR_1</eadid></eadheader>
<archdesc level="fonds" type="inventaire">
  <did><unittitle>Fonds Dupont</unittitle><unitid>1 J</unitid><unitdate normal="1800/1900">1800-1900</unitdate></did>
  <controlaccess><subject>Mines</subject></controlaccess>
  <dsc>
    <c01 id="a"><did><unittitle>Série A</unittitle></did>
      <controlaccess><subject>mines</subject></controlaccess>
      <c02 id="a1"><did><unitdate>1850</unitdate></did></c02>
      <c02 id="a2"><head>no did here</head><c03><did><unittitle>lost</unittitle></did></c03></c02>
      <c02 id="a3"><did><unittitle>A3</unittitle><unitid>1 J 3</unitid></did></c02>
    </c01>
    <c01 id="b"><did><unittitle>Série B</unittitle></did></c01>
  </dsc>
</archdesc></ead>"#;

    fn read() -> (RootProps, Vec<ComponentNode>) {
        let tree = XmlTree::parse_str(FA).unwrap();
        let resolver = DaoResolver::default();
        let reader = FindingAidReader::new(&tree, &resolver).unwrap();
        let root = reader.root_props();
        let components = reader.components(&root);
        (root, components)
    }

    #[test]
    fn walks_in_preorder_and_skips_invalid_subtrees() {
        let (_, components) = read();
        let paths: Vec<Vec<usize>> = components.iter().map(|c| c.path.clone()).collect();
        assert_eq!(paths, vec![vec![0], vec![0, 0], vec![0, 2], vec![1]]);
        let ids: Vec<Option<&str>> = components
            .iter()
            .map(|c| c.component_id.as_deref())
            .collect();
        assert_eq!(ids, vec![Some("a"), Some("a1"), Some("a3"), Some("b")]);
    }

    #[test]
    fn unset_fields_are_inherited() {
        let (root, components) = read();
        assert_eq!(root.fatype.as_deref(), Some("inventaire"));
        let a1 = &components[1];
        // own unitdate gives the title and the range
        assert_eq!(a1.identity.title.as_deref(), Some("1850"));
        assert_eq!(a1.identity.dates, YearRange::new(Some(1850), Some(1850)));
        assert_eq!(a1.identity.unitid.as_deref(), Some("1 J"));
        let a = &components[0];
        assert_eq!(a.identity.dates, YearRange::new(Some(1800), Some(1900)));
        assert_eq!(components[2].identity.unitid.as_deref(), Some("1 J 3"));
    }

    #[test]
    fn ancestor_entries_keep_variants() {
        let (_, components) = read();
        let labels: Vec<&str> = components[0]
            .index_entries
            .iter()
            .map(|e| e.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Mines", "mines"]);
        assert_eq!(components[1].index_entries.len(), 2);
        assert_eq!(components[3].index_entries.len(), 1);
    }

    #[test]
    fn missing_structure_is_rejected() {
        let resolver = DaoResolver::default();
        let tree = XmlTree::parse_str("<ead><eadheader/></ead>").unwrap();
        assert!(matches!(
            FindingAidReader::new(&tree, &resolver),
            Err(ImportError::InvalidFindingAid(_))
        ));
        let tree = XmlTree::parse_str("<ead><archdesc><dsc/></archdesc></ead>").unwrap();
        assert!(FindingAidReader::new(&tree, &resolver).is_err());
    }
}
