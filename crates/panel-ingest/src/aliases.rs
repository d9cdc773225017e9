//! Irregular clinical indications
//!
//! A few indications cannot be read off the test directory as written:
//!
//! - `R27.1` lists a "relevant panel" that does not exist in the catalog;
//!   the DDG2P panel (484) is used instead.
//! - `R266.1` belongs to a catalog panel deprecated in December 2020; its
//!   targets are those of `R80`, `R81` and `R83`.
//!
//! Builder and checker both resolve indications through
//! [`resolve_indications`], so aliased indications compare equal on both
//! sides.

use crate::test_directory::{ci_id, IndicationEntry, Target};
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasAction {
    /// Replace the listed targets
    Override(Vec<Target>),
    /// Union of the targets of every indication with one of these ids
    Redirect(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pub code: String,
    pub name: String,
    pub gemini_name: String,
    pub action: AliasAction,
}

/// Fixed table of irregular indications
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: Vec<AliasEntry>,
}

impl AliasTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        Self {
            entries: vec![
                AliasEntry {
                    code: "R27.1".to_string(),
                    name: "Congenital malformation and dysmorphism syndromes".to_string(),
                    gemini_name: "R27.1a_Congenital malformation and dysmorphism syndromes - microarray and sequencing (DDG2P)_P".to_string(),
                    action: AliasAction::Override(vec![Target::Panel("484".to_string())]),
                },
                AliasEntry {
                    code: "R266.1".to_string(),
                    name: "Neuromuscular arthrogryposis".to_string(),
                    gemini_name: "R266.1_Neuromuscular_arthrogryposis".to_string(),
                    action: AliasAction::Redirect(vec![
                        "R80".to_string(),
                        "R81".to_string(),
                        "R83".to_string(),
                    ]),
                },
            ],
        }
    }

    pub fn with_entry(mut self, entry: AliasEntry) -> Self {
        self.entries.retain(|e| e.code != entry.code);
        self.entries.push(entry);
        self
    }

    pub fn get(&self, code: &str) -> Option<&AliasEntry> {
        self.entries.iter().find(|e| e.code == code)
    }

    pub fn entries(&self) -> &[AliasEntry] {
        &self.entries
    }
}

/// Indication with its final target list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIndication {
    pub code: String,
    pub name: String,
    pub gemini_name: String,
    pub test_method: Option<String>,
    pub targets: Vec<Target>,
}

/// Apply the alias table to the directory entries
///
/// Directory order is kept. An alias code missing from the directory is
/// appended, in alias-table order, only when it would resolve: an override
/// whose targets all pass `known`, or a redirect with at least one source
/// target. Target lists are deduplicated keeping the first occurrence.
pub fn resolve_indications(
    entries: &[IndicationEntry],
    aliases: &AliasTable,
    known: impl Fn(&Target) -> bool,
) -> Vec<ResolvedIndication> {
    let mut resolved: Vec<ResolvedIndication> = entries
        .iter()
        .map(|entry| {
            let mut indication = ResolvedIndication {
                code: entry.code.clone(),
                name: entry.name.clone(),
                gemini_name: entry.gemini_name.clone(),
                test_method: entry.test_method.clone(),
                targets: dedup_targets(entry.targets()),
            };
            if let Some(AliasEntry {
                gemini_name,
                action: AliasAction::Override(targets),
                ..
            }) = aliases.get(&entry.code)
            {
                indication.gemini_name = gemini_name.clone();
                indication.targets = dedup_targets(targets.clone());
            }
            indication
        })
        .collect();

    for alias in aliases.entries() {
        if resolved.iter().any(|r| r.code == alias.code) {
            continue;
        }
        let targets = match &alias.action {
            AliasAction::Override(targets) => {
                let missing: Vec<&str> = targets.iter().filter(|&t| !known(t)).map(Target::as_str).collect();
                if !missing.is_empty() {
                    warn!(code = %alias.code, missing = ?missing, "Skipping absent alias with unknown targets");
                    continue;
                }
                dedup_targets(targets.clone())
            },
            AliasAction::Redirect(ci_ids) => {
                if redirect_union(&resolved, &alias.code, ci_ids).is_empty() {
                    warn!(code = %alias.code, sources = ?ci_ids, "Skipping absent alias with no source targets");
                    continue;
                }
                Vec::new()
            },
        };
        resolved.push(ResolvedIndication {
            code: alias.code.clone(),
            name: alias.name.clone(),
            gemini_name: alias.gemini_name.clone(),
            test_method: None,
            targets,
        });
    }

    // Redirects read the already-overridden targets of their sources
    for alias in aliases.entries() {
        let AliasAction::Redirect(ci_ids) = &alias.action else {
            continue;
        };
        let union = redirect_union(&resolved, &alias.code, ci_ids);

        if let Some(indication) = resolved.iter_mut().find(|r| r.code == alias.code) {
            debug!(code = %alias.code, targets = union.len(), "Redirected indication");
            indication.gemini_name = alias.gemini_name.clone();
            indication.targets = union;
        }
    }

    resolved
}

/// Targets of every other indication whose id is one of `ci_ids`
fn redirect_union(resolved: &[ResolvedIndication], code: &str, ci_ids: &[String]) -> Vec<Target> {
    let union: Vec<Target> = resolved
        .iter()
        .filter(|r| r.code != code && ci_ids.iter().any(|id| id == ci_id(&r.code)))
        .flat_map(|r| r.targets.iter().cloned())
        .collect();
    dedup_targets(union)
}

fn dedup_targets(targets: Vec<Target>) -> Vec<Target> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
