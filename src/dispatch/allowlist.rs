//! Allow-list of dispatchable module functions
//!
//! Maps a module path (tuple of segments) to the glob patterns its callable
//! names must match. Built once at startup; nothing outside it is reachable.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashMap;

use crate::config::{AllowRule, ConfigError};

/// Built-in allow-list: module path and permitted function globs
pub const DEFAULT_APPS: &[(&str, &[&str])] = &[
    ("agasc", &["get_star", "get_stars", "get_agasc_cone"]),
    ("mica.starcheck", &["get_*"]),
    (
        "mica.archive.aca_dark.dark_cal",
        &[
            "get_dark_cal_id",
            "get_dark_cal_ids",
            "get_dark_cal_image",
            "get_dark_cal_props",
        ],
    ),
    ("kadi.events", &["*.filter"]),
    (
        "kadi.commands",
        &["get_cmds", "get_observations", "get_starcats"],
    ),
    ("kadi.commands.states", &["get_states"]),
];

/// Built-in rules in configuration form
pub fn default_rules() -> Vec<AllowRule> {
    DEFAULT_APPS
        .iter()
        .map(|(module, functions)| AllowRule {
            module: (*module).to_string(),
            functions: functions.iter().map(|f| (*f).to_string()).collect(),
        })
        .collect()
}

/// Compiled patterns for one module path
#[derive(Debug)]
pub struct AllowEntry {
    module: String,
    patterns: Vec<String>,
    matcher: GlobSet,
}

impl AllowEntry {
    /// Dotted module name, e.g. `mica.starcheck`
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a dotted function name matches one of the globs
    pub fn allows(&self, function: &str) -> bool {
        self.matcher.is_match(function)
    }
}

#[derive(Debug)]
pub struct AllowList {
    entries: HashMap<Vec<String>, AllowEntry>,
}

impl AllowList {
    pub fn new(rules: &[AllowRule]) -> Result<Self, ConfigError> {
        let mut entries = HashMap::with_capacity(rules.len());
        for rule in rules {
            let mut builder = GlobSetBuilder::new();
            for pattern in &rule.functions {
                let glob = Glob::new(pattern).map_err(|source| ConfigError::AllowList {
                    module: rule.module.clone(),
                    source,
                })?;
                builder.add(glob);
            }
            let matcher = builder.build().map_err(|source| ConfigError::AllowList {
                module: rule.module.clone(),
                source,
            })?;
            let key: Vec<String> = rule.module.split('.').map(ToString::to_string).collect();
            entries.insert(
                key,
                AllowEntry {
                    module: rule.module.clone(),
                    patterns: rule.functions.clone(),
                    matcher,
                },
            );
        }
        Ok(Self { entries })
    }

    /// Entry for an exact module path
    pub fn get(&self, module_parts: &[&str]) -> Option<&AllowEntry> {
        let key: Vec<String> = module_parts.iter().map(|p| (*p).to_string()).collect();
        self.entries.get(&key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &AllowEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
