//! Conversion of descriptive EAD blocks into a small, fixed HTML subset.
//!
//! The output vocabulary is closed: `div`, `b`, `i`, `em`, `u`, `sup`,
//! `sub`, `ul`, `li`, `br`, `a` and `span`, with `ead-*` classes carrying
//! the source element name. Text is always escaped.

use quick_xml::escape::{escape, partial_escape};

use crate::text::collapse_whitespace;
use crate::xml::Node;

/// Elements rendered as a block (`div.ead-section`) when nested.
const BLOCK_TAGS: &[&str] = &[
    "accessrestrict",
    "accruals",
    "acqinfo",
    "altformavail",
    "appraisal",
    "arrangement",
    "bibliography",
    "bioghist",
    "blockquote",
    "custodhist",
    "descgrp",
    "fileplan",
    "index",
    "odd",
    "originalsloc",
    "otherfindaid",
    "phystech",
    "prefercite",
    "processinfo",
    "relatedmaterial",
    "scopecontent",
    "separatedmaterial",
    "userestrict",
];

const LINK_TAGS: &[&str] = &["extref", "archref", "ref", "extptr", "bibref"];

/// Sub-elements of `physdesc` grouped by label.
const PHYSDESC_GROUPED: &[(&str, &str)] = &[
    ("physfacet", "Particularités physiques"),
    ("extent", "Importance matérielle"),
    ("dimensions", "Dimensions"),
];

/// Render each node as one `div.ead-section` inside a common wrapper.
/// `None` when no node carries any text.
pub fn render_sections(nodes: &[Node<'_>]) -> Option<String> {
    let mut body = String::new();
    for node in nodes {
        if is_blank(node) {
            continue;
        }
        body.push_str(&format!(r#"<div class="ead-section ead-{}">"#, node.tag()));
        if let Some(label) = node.attr_nonempty("label") {
            push_autolabel(label, &mut body);
        }
        render_children(node, &mut body, &[]);
        body.push_str("</div>");
    }
    wrap(body)
}

/// Render the children of `physdesc` elements: facets, extents and
/// dimensions are grouped under their label (the element's own `label`
/// attribute overriding the default), everything else follows as free text.
pub fn render_physdesc(nodes: &[Node<'_>]) -> Option<String> {
    let mut body = String::new();
    for physdesc in nodes {
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for child in physdesc.elements() {
            let Some(default_label) = PHYSDESC_GROUPED
                .iter()
                .find(|(tag, _)| *tag == child.tag())
                .map(|(_, label)| *label)
            else {
                continue;
            };
            if is_blank(&child) {
                continue;
            }
            let label = child
                .attr_nonempty("label")
                .unwrap_or(default_label)
                .to_string();
            let mut value = String::new();
            render_children(&child, &mut value, &[]);
            match groups.iter_mut().find(|(l, _)| *l == label) {
                Some((_, values)) => values.push(value.trim().to_string()),
                None => groups.push((label, vec![value.trim().to_string()])),
            }
        }

        for (label, values) in &groups {
            body.push_str(&format!(
                r#"<div class="ead-section ead-physdesc"><div class="ead-label">{}</div><div class="ead-p">{}</div></div>"#,
                partial_escape(label.as_str()),
                values.join(" ; ")
            ));
        }

        let skip: Vec<&str> = PHYSDESC_GROUPED.iter().map(|(tag, _)| *tag).collect();
        let mut rest = String::new();
        render_children(physdesc, &mut rest, &skip);
        if !strip_for_blank_check(&rest).is_empty() {
            body.push_str(&format!(r#"<div class="ead-p">{}</div>"#, rest.trim()));
        }
    }
    wrap(body)
}

/// `materialspec` uses plain labels rather than the autolabel style.
pub fn render_materialspec(nodes: &[Node<'_>]) -> Option<String> {
    render_sections(nodes).map(|html| html.replace("ead-autolabel", "ead-label"))
}

fn wrap(body: String) -> Option<String> {
    if body.is_empty() {
        None
    } else {
        Some(format!(r#"<div class="ead-wrapper">{}</div>"#, body))
    }
}

fn is_blank(node: &Node<'_>) -> bool {
    node.text().trim().is_empty()
        && !node
            .descendants()
            .iter()
            .any(|n| n.attr_nonempty("href").is_some())
}

fn strip_for_blank_check(html: &str) -> String {
    crate::text::clean(&crate::text::remove_html_tags(html))
}

fn render_children(node: &Node<'_>, out: &mut String, skip: &[&str]) {
    for child in node.children() {
        match child.as_text() {
            Some(text) => out.push_str(&partial_escape(collapse_whitespace(text).as_str())),
            None if skip.contains(&child.tag()) => {}
            None => render_element(&child, out),
        }
    }
}

fn render_element(node: &Node<'_>, out: &mut String) {
    let tag = node.tag();
    if let Some(label) = node.attr_nonempty("label") {
        push_autolabel(label, out);
    }
    match tag {
        "p" => wrapped(node, out, r#"<div class="ead-p">"#, "</div>"),
        "head" => wrapped(node, out, r#"<div class="ead-label">"#, "</div>"),
        "lb" => out.push_str("<br />"),
        "list" | "chronlist" => wrapped(
            node,
            out,
            &format!(r#"<ul class="ead-{}">"#, tag),
            "</ul>",
        ),
        "item" | "defitem" | "chronitem" => wrapped(node, out, "<li>", "</li>"),
        "emph" | "title" if tag == "emph" || node.attr("render").is_some() => {
            let html_tag = match node.attr("render").unwrap_or("") {
                "bold" | "boldunderline" | "boldsmcaps" => "b",
                "italic" | "bolditalic" => "i",
                "super" | "superscript" => "sup",
                "sub" | "subscript" => "sub",
                "underline" => "u",
                _ => "em",
            };
            wrapped(node, out, &format!("<{}>", html_tag), &format!("</{}>", html_tag));
        }
        "legalstatus" => {
            out.push_str(r#"<span class="ead-legalstatus">"#);
            if let Some(prefix) = node.attr_nonempty("altrender") {
                out.push_str(&format!("{}. ", partial_escape(prefix)));
            }
            render_children(node, out, &[]);
            out.push_str("</span>");
        }
        _ if LINK_TAGS.contains(&tag) => match node.attr_nonempty("href") {
            Some(href) => {
                out.push_str(&format!(
                    r#"<a href="{}" rel="nofollow noopener noreferrer" target="_blank">"#,
                    escape(href)
                ));
                if node.text().trim().is_empty() {
                    out.push_str(&partial_escape(href));
                } else {
                    render_children(node, out, &[]);
                }
                out.push_str("</a>");
            }
            None => render_children(node, out, &[]),
        },
        _ if BLOCK_TAGS.contains(&tag) => wrapped(
            node,
            out,
            &format!(r#"<div class="ead-section ead-{}">"#, tag),
            "</div>",
        ),
        _ => wrapped(node, out, &format!(r#"<span class="ead-{}">"#, tag), "</span>"),
    }
}

fn push_autolabel(label: &str, out: &mut String) {
    out.push_str(&format!(
        r#"<b class="ead-autolabel">{}:</b> "#,
        partial_escape(label)
    ));
}

fn wrapped(node: &Node<'_>, out: &mut String, open: &str, close: &str) {
    out.push_str(open);
    render_children(node, out, &[]);
    out.push_str(close);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlTree;

    fn first<'a>(tree: &'a XmlTree, path: &str) -> Vec<Node<'a>> {
        tree.root().unwrap().select(path)
    }

    #[test]
    fn renders_paragraphs_and_emphasis() {
        let tree = XmlTree::parse_str(
            r#"<r><scopecontent><head>Présentation</head><p>Fonds <emph render="italic">Dupont</emph> &amp; fils<lb/>suite</p></scopecontent></r>"#,
        )
        .unwrap();
        let html = render_sections(&first(&tree, "scopecontent")).unwrap();
        assert_eq!(
            html,
            r#"<div class="ead-wrapper"><div class="ead-section ead-scopecontent"><div class="ead-label">Présentation</div><div class="ead-p">Fonds <i>Dupont</i> &amp; fils<br />suite</div></div></div>"#
        );
    }

    #[test]
    fn absent_or_blank_section_is_none() {
        let tree = XmlTree::parse_str("<r><bioghist>  <p> </p></bioghist></r>").unwrap();
        assert!(render_sections(&first(&tree, "scopecontent")).is_none());
        assert!(render_sections(&first(&tree, "bioghist")).is_none());
    }

    #[test]
    fn links_open_in_new_tab() {
        let tree = XmlTree::parse_str(
            r#"<r><relatedmaterial><p><extref href="http://a.b/c?x=1&amp;y=2">voir</extref></p></relatedmaterial></r>"#,
        )
        .unwrap();
        let html = render_sections(&first(&tree, "relatedmaterial")).unwrap();
        assert!(html.contains(
            r#"<a href="http://a.b/c?x=1&amp;y=2" rel="nofollow noopener noreferrer" target="_blank">voir</a>"#
        ));
    }

    #[test]
    fn physdesc_groups_by_label() {
        let tree = XmlTree::parse_str(
            r#"<r><physdesc>Registre <extent>3 pièces</extent><extent>2 plans</extent><physfacet label="Support">papier</physfacet><genreform>plan</genreform></physdesc></r>"#,
        )
        .unwrap();
        let html = render_physdesc(&first(&tree, "physdesc")).unwrap();
        assert!(html.contains(
            r#"<div class="ead-label">Importance matérielle</div><div class="ead-p">3 pièces ; 2 plans</div>"#
        ));
        assert!(html.contains(r#"<div class="ead-label">Support</div><div class="ead-p">papier</div>"#));
        assert!(html.contains(r#"<div class="ead-p">Registre <span class="ead-genreform">plan</span></div>"#));
    }

    #[test]
    fn legalstatus_prefix_and_materialspec_labels() {
        let tree = XmlTree::parse_str(
            r#"<r><accessrestrict><legalstatus altrender="Statut">Archives publiques</legalstatus></accessrestrict><materialspec label="Échelle">1/1000</materialspec></r>"#,
        )
        .unwrap();
        let access = render_sections(&first(&tree, "accessrestrict")).unwrap();
        assert!(access.contains("Statut. Archives publiques"));
        let spec = render_materialspec(&first(&tree, "materialspec")).unwrap();
        assert!(spec.contains(r#"<b class="ead-label">Échelle:</b>"#));
        assert!(!spec.contains("ead-autolabel"));
    }
}
