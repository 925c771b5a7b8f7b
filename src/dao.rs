//! Digitized-object resolution.
//!
//! Pointer nodes (`dao`, `daoloc`) and legacy `daogrp` groups are turned
//! into [`DigitizedVersion`] triples. Two data-driven exceptions come from
//! configuration rather than code:
//!
//! - image extensions: a pointer to an image with no role is a thumbnail;
//! - provider rules: for finding aids whose `eadid` starts with a given
//!   prefix, URLs are rebuilt from a regex capture and a template.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{DigitizedConfig, GroupRoles};
use crate::xml::Node;

pub const THUMBNAIL_ROLE: &str = "thumbnail";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitizedVersion {
    pub role: Option<String>,
    pub url: Option<String>,
    pub illustration_url: Option<String>,
}

/// Compiled provider-specific URL rule.
#[derive(Debug, Clone)]
pub struct ProviderRule {
    pub provider_prefix: String,
    pub pattern: Regex,
    pub template: String,
}

impl ProviderRule {
    fn applies_to(&self, eadid: &str) -> bool {
        eadid
            .to_ascii_lowercase()
            .starts_with(&self.provider_prefix.to_ascii_lowercase())
    }

    /// Substitute every named capture into the template. `None` when the
    /// URL does not match the provider's pattern.
    fn rebuild(&self, url: &str) -> Option<String> {
        let caps = self.pattern.captures(url)?;
        let mut out = self.template.clone();
        for name in self.pattern.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                out = out.replace(&format!("{{{}}}", name), m.as_str());
            }
        }
        Some(out)
    }
}

type RoleGroups = Vec<(Option<String>, Vec<DigitizedVersion>)>;

/// URL of the first pointer tagged `role` inside a group.
fn group_part(by_role: &RoleGroups, role: &str) -> Option<String> {
    by_role
        .iter()
        .find(|(r, _)| r.as_deref() == Some(role))
        .and_then(|(_, defs)| defs.first())
        .and_then(|d| d.url.clone())
}

/// Resolver built once per batch from configuration.
#[derive(Debug, Clone)]
pub struct DaoResolver {
    image_extensions: Vec<String>,
    illustration_roles: Vec<String>,
    group_roles: GroupRoles,
    rules: Vec<ProviderRule>,
}

impl Default for DaoResolver {
    fn default() -> Self {
        Self::new(&DigitizedConfig::default(), Vec::new())
    }
}

impl DaoResolver {
    pub fn new(config: &DigitizedConfig, rules: Vec<ProviderRule>) -> Self {
        DaoResolver {
            image_extensions: config
                .image_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            illustration_roles: config
                .illustration_roles
                .iter()
                .map(|r| r.to_ascii_lowercase())
                .collect(),
            group_roles: config.group_roles.clone(),
            rules,
        }
    }

    fn is_image(&self, href: &str) -> bool {
        let path = href.split(['?', '#']).next().unwrap_or(href);
        let lower = path.to_ascii_lowercase();
        self.image_extensions.iter().any(|ext| lower.ends_with(ext))
    }

    /// Resolve one `dao`/`daoloc` pointer. `None` without an `href`.
    pub fn daodef(&self, node: &Node<'_>) -> Option<DigitizedVersion> {
        let href = node.attr_nonempty("href")?.to_string();
        let mut role = node
            .attr_nonempty("role")
            .or_else(|| node.attr_nonempty("title"))
            .map(str::to_string);
        if role.is_none() && self.is_image(&href) {
            role = Some(THUMBNAIL_ROLE.to_string());
        }
        let illustrated = role
            .as_deref()
            .map(|r| self.illustration_roles.contains(&r.to_ascii_lowercase()))
            .unwrap_or(false);
        Some(if illustrated {
            DigitizedVersion {
                role,
                url: None,
                illustration_url: Some(href),
            }
        } else {
            DigitizedVersion {
                role,
                url: Some(href),
                illustration_url: None,
            }
        })
    }

    /// Resolve a legacy `daogrp`.
    ///
    /// When the group carries folder, prefix and extension parts, the
    /// first/last page parts are rebuilt into
    /// `{folder}/{prefix}{index}.{extension}` thumbnails. Any part that was
    /// not consumed by the reconstruction is passed through unchanged.
    pub fn merge_daogrp(&self, group: &Node<'_>) -> Vec<DigitizedVersion> {
        let mut illustrations = Vec::new();
        let mut by_role: RoleGroups = Vec::new();
        for pointer in group.elements().filter(|n| matches!(n.tag(), "dao" | "daoloc")) {
            let Some(def) = self.daodef(&pointer) else {
                continue;
            };
            if def.illustration_url.is_some() {
                illustrations.push(def);
                continue;
            }
            match by_role.iter_mut().find(|(r, _)| *r == def.role) {
                Some((_, defs)) => defs.push(def),
                None => by_role.push((def.role.clone(), vec![def])),
            }
        }

        let roles = &self.group_roles;
        let folder = group_part(&by_role, &roles.folder);
        let prefix = group_part(&by_role, &roles.prefix);
        let extension = group_part(&by_role, &roles.extension);

        let mut rebuilt = Vec::new();
        if let (Some(folder), Some(prefix), Some(extension)) = (folder, prefix, extension) {
            let consumed = [
                roles.folder.as_str(),
                roles.prefix.as_str(),
                roles.extension.as_str(),
                roles.first.as_str(),
                roles.last.as_str(),
            ];
            for page_role in [&roles.first, &roles.last] {
                if let Some(index) = group_part(&by_role, page_role) {
                    rebuilt.push(DigitizedVersion {
                        role: Some(THUMBNAIL_ROLE.to_string()),
                        url: None,
                        illustration_url: Some(format!(
                            "{}/{}{}.{}",
                            folder, prefix, index, extension
                        )),
                    });
                }
            }
            by_role.retain(|(r, _)| !r.as_deref().map(|r| consumed.contains(&r)).unwrap_or(false));
        }

        illustrations
            .into_iter()
            .chain(rebuilt)
            .chain(by_role.into_iter().flat_map(|(_, defs)| defs))
            .collect()
    }

    /// Every digitized version attached directly to a record element.
    pub fn component_daos(&self, record: &Node<'_>) -> Vec<DigitizedVersion> {
        let mut out = Vec::new();
        for path in ["dao", "daoloc", "did/dao", "did/daoloc"] {
            out.extend(record.select(path).iter().filter_map(|n| self.daodef(n)));
        }
        for path in ["daogrp", "did/daogrp"] {
            for group in record.select(path) {
                out.extend(self.merge_daogrp(&group));
            }
        }
        out
    }

    /// Apply the provider rules matching `eadid`. URLs that do not fit the
    /// provider's pattern are kept as they are, with a warning.
    pub fn apply_provider_rules(&self, eadid: &str, versions: &mut [DigitizedVersion]) {
        for rule in self.rules.iter().filter(|r| r.applies_to(eadid)) {
            for version in versions.iter_mut() {
                for slot in [&mut version.url, &mut version.illustration_url] {
                    let Some(url) = slot.as_deref() else {
                        continue;
                    };
                    match rule.rebuild(url) {
                        Some(rebuilt) => *slot = Some(rebuilt),
                        None => tracing::warn!(
                            eadid,
                            provider = %rule.provider_prefix,
                            "unparsable digitized-object URL kept as is: {}",
                            url
                        ),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlTree;

    fn resolve(xml: &str) -> Vec<DigitizedVersion> {
        let tree = XmlTree::parse_str(xml).unwrap();
        DaoResolver::default().component_daos(&tree.root().unwrap())
    }

    #[test]
    fn image_without_role_is_a_thumbnail() {
        let daos = resolve(r#"<c><did><dao href="http://img/1.JPG"/></did></c>"#);
        assert_eq!(
            daos,
            vec![DigitizedVersion {
                role: Some("thumbnail".into()),
                url: None,
                illustration_url: Some("http://img/1.JPG".into()),
            }]
        );
    }

    #[test]
    fn explicit_role_is_kept() {
        let daos = resolve(
            r#"<c><dao href="http://viewer/1.jpg" title="visualiser"/><daoloc href="http://x/doc.pdf"/></c>"#,
        );
        assert_eq!(daos[0].role.as_deref(), Some("visualiser"));
        assert_eq!(daos[0].url.as_deref(), Some("http://viewer/1.jpg"));
        assert_eq!(daos[1].role, None);
        assert_eq!(daos[1].url.as_deref(), Some("http://x/doc.pdf"));
    }

    #[test]
    fn daogrp_rebuilds_first_and_last_pages() {
        let daos = resolve(
            r#"<c><daogrp>
                <daoloc role="dossier" href="FRAD085/2Num8_126"/>
                <daoloc role="prefixe" href="2Num8_126_"/>
                <daoloc role="extension" href="jpg"/>
                <daoloc role="premier" href="001"/>
                <daoloc role="dernier" href="012"/>
                <daoloc role="nombre" href="12"/>
            </daogrp></c>"#,
        );
        let pages: Vec<(Option<&str>, Option<&str>, Option<&str>)> = daos
            .iter()
            .map(|d| (d.role.as_deref(), d.url.as_deref(), d.illustration_url.as_deref()))
            .collect();
        assert_eq!(
            pages,
            vec![
                (Some("thumbnail"), None, Some("FRAD085/2Num8_126/2Num8_126_001.jpg")),
                (Some("thumbnail"), None, Some("FRAD085/2Num8_126/2Num8_126_012.jpg")),
                (Some("nombre"), Some("12"), None),
            ]
        );
    }

    #[test]
    fn incomplete_daogrp_passes_parts_through() {
        let daos = resolve(
            r#"<c><daogrp><daoloc role="dossier" href="a"/><daoloc role="premier" href="1"/></daogrp></c>"#,
        );
        assert_eq!(daos.len(), 2);
        assert_eq!(daos[0].role.as_deref(), Some("dossier"));
    }

    #[test]
    fn provider_rule_only_for_matching_eadid() {
        let rule = ProviderRule {
            provider_prefix: "FRAD054".into(),
            pattern: Regex::new(r"/series/(?P<series>[^/]+)/").unwrap(),
            template: "https://viewer.example/?cote={series}".into(),
        };
        let resolver = DaoResolver::new(&DigitizedConfig::default(), vec![rule]);
        let original = vec![
            DigitizedVersion {
                role: None,
                url: Some("http://old/series/3P12/page.jpg".into()),
                illustration_url: None,
            },
            DigitizedVersion {
                role: None,
                url: Some("http://old/other".into()),
                illustration_url: None,
            },
        ];

        let mut untouched = original.clone();
        resolver.apply_provider_rules("FRAD085_IR_1", &mut untouched);
        assert_eq!(untouched, original);

        let mut rebuilt = original.clone();
        resolver.apply_provider_rules("frad054_ir_1", &mut rebuilt);
        assert_eq!(
            rebuilt[0].url.as_deref(),
            Some("https://viewer.example/?cote=3P12")
        );
        assert_eq!(rebuilt[1].url.as_deref(), Some("http://old/other"));
    }
}
