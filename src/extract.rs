//! Field extractors: pure functions from a subtree to a typed field bag.
//!
//! | Function | Input | Output |
//! |----------|-------|--------|
//! | [`did_infos`] | a `did` element | [`Identity`] |
//! | [`descriptive_text`] | `archdesc` or a component | [`DescriptiveText`] |
//! | [`header_infos`] | the document root | [`HeaderInfo`] |
//!
//! HTML-valued fields go through [`crate::html`] and are `None` when the
//! source element is absent or empty.

use serde::{Deserialize, Serialize};

use crate::dates::{parse_unitdate, YearRange};
use crate::html::{render_materialspec, render_physdesc, render_sections};
use crate::text::{clean, clean_identifier, clean_opt};
use crate::xml::Node;

/// Title given to records with neither a title nor a date label.
pub const UNTITLED: &str = "Sans titre";

/// Longest external link kept on a record.
pub const MAX_EXTPTR_CHARS: usize = 2048;

const TITLE_SEPARATOR: &str = " | ";

/// Identity block of a record. `None` fields are unset and may be
/// inherited from the parent record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub title: Option<String>,
    pub unitid: Option<String>,
    pub dates: YearRange,
    pub date_label: Option<String>,
    pub extptr: Option<String>,
    pub lang_description: Option<String>,
    pub lang_code: Option<String>,
    pub note: Option<String>,
    pub origination: Option<String>,
    pub physloc: Option<String>,
    pub repository: Option<String>,
    #[serde(rename = "abstract")]
    pub summary: Option<String>,
    pub physdesc: Option<String>,
    pub materialspec: Option<String>,
}

impl Identity {
    /// Title to display: own title, else the placeholder.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNTITLED)
    }
}

/// Extract the identity block of a `did`. `component_id` is the `id`
/// attribute of the owning component, used to derive ARK links.
pub fn did_infos(did: &Node<'_>, component_id: Option<&str>) -> Identity {
    let titles: Vec<String> = did
        .select("unittitle")
        .iter()
        .map(|t| {
            t.text_parts()
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .map(|t| clean(&t))
        .filter(|t| !t.is_empty())
        .collect();

    let unitdate = did.select_first("unitdate");
    let date_label = unitdate.and_then(|d| clean_opt(&d.text()));
    let dates = match unitdate {
        Some(d) => parse_unitdate(d.attr_nonempty("normal"), date_label.as_deref()),
        None => YearRange::default(),
    };

    let title = if titles.is_empty() {
        date_label.clone()
    } else {
        Some(titles.join(TITLE_SEPARATOR))
    };

    let unitids: Vec<String> = did
        .select("unitid")
        .iter()
        .filter_map(|u| clean_opt(&u.text()))
        .collect();
    let unitid = if unitids.is_empty() {
        None
    } else {
        Some(clean_identifier(&unitids.join(" ")))
    };

    let language = did.select_first("langmaterial");

    Identity {
        title,
        unitid,
        dates,
        date_label,
        extptr: extptr(did, component_id),
        lang_description: language.and_then(|l| clean_opt(&l.text())),
        lang_code: language
            .and_then(|l| l.select_first("language"))
            .and_then(|l| l.attr_nonempty("langcode"))
            .map(str::to_string),
        note: render_sections(&did.select("note")),
        origination: render_sections(&did.select("origination")),
        physloc: render_sections(&did.select("physloc")),
        repository: render_sections(&did.select("repository")),
        summary: render_sections(&did.select("abstract")),
        physdesc: render_physdesc(&did.select("physdesc")),
        materialspec: render_materialspec(&did.select("materialspec")),
    }
}

fn extptr(did: &Node<'_>, component_id: Option<&str>) -> Option<String> {
    let href = did
        .select("unitid[@type=external_link]//extptr")
        .into_iter()
        .chain(did.select("unitid/extptr"))
        .find_map(|n| n.attr_nonempty("href").map(str::to_string))
        .or_else(|| component_id.and_then(ark_from_id));
    match href {
        Some(href) if href.chars().count() > MAX_EXTPTR_CHARS => {
            tracing::warn!(
                "external link longer than {} characters dropped: {}...",
                MAX_EXTPTR_CHARS,
                href.chars().take(80).collect::<String>()
            );
            None
        }
        other => other,
    }
}

/// `ark--12148-cb123` → `ark:/12148/cb123`.
fn ark_from_id(id: &str) -> Option<String> {
    let id = id.trim();
    if !id.starts_with("ark-") {
        return None;
    }
    Some(id.replacen("ark-", "ark:", 1).replace('-', "/"))
}

/// Free-text sections shared by roots and components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveText {
    pub description: Option<String>,
    pub bibliography: Option<String>,
    pub acquisition_info: Option<String>,
    pub additional_resources: Option<String>,
    pub scopecontent: Option<String>,
    pub accessrestrict: Option<String>,
    pub userestrict: Option<String>,
    pub notes: Option<String>,
    pub bioghist: Option<String>,
}

fn section(record: &Node<'_>, tags: &[&str]) -> Option<String> {
    let mut nodes: Vec<Node<'_>> = tags.iter().flat_map(|t| record.select(t)).collect();
    nodes.sort_by_key(|n| n.id());
    render_sections(&nodes)
}

pub fn descriptive_text(record: &Node<'_>) -> DescriptiveText {
    DescriptiveText {
        description: section(record, &["accruals", "appraisal", "arrangement"]),
        bibliography: section(record, &["bibliography", "bibref"]),
        acquisition_info: section(record, &["acqinfo", "custodhist"]),
        additional_resources: section(
            record,
            &[
                "otherfindaid",
                "relatedmaterial",
                "separatedmaterial",
                "originalsloc",
            ],
        ),
        scopecontent: section(record, &["scopecontent"]),
        accessrestrict: section(record, &["accessrestrict"]),
        userestrict: section(record, &["userestrict"]),
        notes: section(record, &["odd"]),
        bioghist: section(record, &["bioghist"]),
    }
}

/// Properties of the `eadheader`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderInfo {
    pub eadid: Option<String>,
    pub website_url: Option<String>,
    pub titleproper: Option<String>,
    pub titlestmt: Option<String>,
    pub publicationstmt: Option<String>,
    pub publisher: Option<String>,
    pub author: Option<String>,
    pub creation: Option<String>,
    pub descrules: Option<String>,
    pub langusage: Option<String>,
    pub changes: Option<String>,
}

pub fn header_infos(root: &Node<'_>) -> HeaderInfo {
    let text_of = |path: &str| root.select_first(path).and_then(|n| clean_opt(&n.text()));
    let eadid = root.select_first("eadheader/eadid");
    HeaderInfo {
        eadid: eadid.and_then(|n| clean_opt(&n.text())),
        website_url: eadid
            .and_then(|n| n.attr_nonempty("url"))
            .map(str::to_string),
        titleproper: text_of("eadheader/filedesc/titlestmt/titleproper"),
        titlestmt: render_sections(&root.select("eadheader/filedesc/titlestmt")),
        publicationstmt: render_sections(&root.select("eadheader/filedesc/publicationstmt")),
        publisher: text_of("eadheader/filedesc/publicationstmt/publisher"),
        author: text_of("eadheader/filedesc/titlestmt/author"),
        creation: text_of("eadheader/profiledesc/creation"),
        descrules: text_of("eadheader/profiledesc/descrules"),
        langusage: text_of("eadheader/profiledesc/langusage"),
        changes: render_sections(&root.select("eadheader/revisiondesc")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlTree;

    fn did_of(xml: &str) -> Identity {
        let tree = XmlTree::parse_str(xml).unwrap();
        let root = tree.root().unwrap();
        did_infos(&root, root.attr("id"))
    }

    #[test]
    fn titles_are_joined() {
        let identity = did_of(
            r#"<did><unittitle>Registre <emph>paroissial</emph></unittitle><unittitle> Tome 2 </unittitle></did>"#,
        );
        assert_eq!(identity.title.as_deref(), Some("Registre paroissial | Tome 2"));
    }

    #[test]
    fn title_falls_back_to_date_then_placeholder() {
        let identity = did_of(r#"<did><unitdate normal="1850/1860">1850-1860</unitdate></did>"#);
        assert_eq!(identity.title.as_deref(), Some("1850-1860"));
        assert_eq!(identity.dates, YearRange::new(Some(1850), Some(1860)));

        let identity = did_of("<did><unitid>3 P 12</unitid></did>");
        assert_eq!(identity.title, None);
        assert_eq!(identity.display_title(), UNTITLED);
        assert_eq!(identity.unitid.as_deref(), Some("3 P 12"));
    }

    #[test]
    fn unitid_drops_file_extension_and_is_truncated() {
        let identity = did_of("<did><unitid>C 12.xml</unitid></did>");
        assert_eq!(identity.unitid.as_deref(), Some("C 12"));

        let identity = did_of("<did><unitid>3 E</unitid><unitid>45.PDF</unitid></did>");
        assert_eq!(identity.unitid.as_deref(), Some("3 E 45"));

        let long = format!("<did><unitid>{}</unitid></did>", "9".repeat(300));
        let unitid = did_of(&long).unitid.unwrap();
        assert_eq!(unitid.chars().count(), 256);
    }

    #[test]
    fn extptr_sources() {
        let identity = did_of(
            r#"<did><unitid type="external_link"><extptr href="http://a/b"/></unitid></did>"#,
        );
        assert_eq!(identity.extptr.as_deref(), Some("http://a/b"));

        let identity = did_of(r#"<did id="ark--12148-cb123"><unittitle>x</unittitle></did>"#);
        assert_eq!(identity.extptr.as_deref(), Some("ark:/12148/cb123"));

        let long = format!(r#"<did><unitid><extptr href="http://a/{}"/></unitid></did>"#, "x".repeat(3000));
        assert_eq!(did_of(&long).extptr, None);
    }

    #[test]
    fn language_and_html_blocks() {
        let identity = did_of(
            r#"<did><langmaterial>Français, <language langcode="fre">français</language></langmaterial>
               <physloc>Magasin 3</physloc><abstract>Résumé</abstract></did>"#,
        );
        assert_eq!(identity.lang_code.as_deref(), Some("fre"));
        assert_eq!(identity.lang_description.as_deref(), Some("Français, français"));
        assert!(identity.physloc.unwrap().contains("Magasin 3"));
        assert!(identity.summary.unwrap().contains("ead-abstract"));
        assert!(identity.note.is_none());
    }

    #[test]
    fn sections_group_tags() {
        let tree = XmlTree::parse_str(
            r#"<archdesc><arrangement><p>Classement</p></arrangement><accruals><p>Aucun</p></accruals>
               <custodhist><p>Historique</p></custodhist><odd><p>Divers</p></odd></archdesc>"#,
        )
        .unwrap();
        let text = descriptive_text(&tree.root().unwrap());
        let description = text.description.unwrap();
        assert!(description.find("Classement").unwrap() < description.find("Aucun").unwrap());
        assert!(text.acquisition_info.unwrap().contains("Historique"));
        assert!(text.notes.unwrap().contains("Divers"));
        assert!(text.scopecontent.is_none());
    }

    #[test]
    fn header_properties() {
        let tree = XmlTree::parse_str(
            r#"<ead><eadheader><eadid url="http://archives.example/ir/1">FRAD054_IR_1</eadid>
                <filedesc><titlestmt><titleproper>Répertoire</titleproper><author>A. Dupont</author></titlestmt>
                <publicationstmt><publisher>Archives de Meurthe-et-Moselle</publisher></publicationstmt></filedesc>
                <profiledesc><creation>2019</creation><langusage>Français</langusage></profiledesc>
            </eadheader></ead>"#,
        )
        .unwrap();
        let header = header_infos(&tree.root().unwrap());
        assert_eq!(header.eadid.as_deref(), Some("FRAD054_IR_1"));
        assert_eq!(header.website_url.as_deref(), Some("http://archives.example/ir/1"));
        assert_eq!(header.titleproper.as_deref(), Some("Répertoire"));
        assert_eq!(header.publisher.as_deref(), Some("Archives de Meurthe-et-Moselle"));
        assert_eq!(header.author.as_deref(), Some("A. Dupont"));
        assert_eq!(header.langusage.as_deref(), Some("Français"));
        assert!(header.changes.is_none());
    }
}
