//! Resolution of the archive service owning a file.
//!
//! The file base name carries the service code before its first
//! underscore (`FRAD054_IR_12.xml` → `FRAD054`). Codes declared under
//! `[services]` win and provide display names; any other prefix yields a
//! service named after its code.

use std::collections::HashMap;
use std::path::Path;

use crate::config::ServiceConfig;
use crate::models::ServiceInfo;

#[derive(Debug, Clone, Default)]
pub struct ServiceMap {
    /// Declared services, longest code first.
    known: Vec<ServiceInfo>,
}

impl ServiceMap {
    pub fn from_config(services: &HashMap<String, ServiceConfig>) -> Self {
        let mut known: Vec<ServiceInfo> = services
            .iter()
            .map(|(code, cfg)| {
                let code = code.trim().to_uppercase();
                ServiceInfo {
                    name: cfg.name.clone().unwrap_or_else(|| code.clone()),
                    title: cfg.title.clone(),
                    level: cfg.level.clone(),
                    code,
                }
            })
            .collect();
        known.sort_by(|a, b| b.code.len().cmp(&a.code.len()).then(a.code.cmp(&b.code)));
        ServiceMap { known }
    }

    /// Service for a file path.
    pub fn resolve(&self, path: &Path) -> ServiceInfo {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.resolve_name(&basename)
    }

    pub fn resolve_name(&self, basename: &str) -> ServiceInfo {
        let upper = basename.to_uppercase();
        if let Some(service) = self
            .known
            .iter()
            .find(|s| upper.starts_with(&format!("{}_", s.code)))
        {
            return service.clone();
        }
        let code = upper.split('_').next().unwrap_or_default().to_string();
        let code = code
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .filter(|_| !upper.contains('_'))
            .unwrap_or(code);
        ServiceInfo {
            name: code.clone(),
            title: None,
            level: None,
            code,
        }
    }
}
