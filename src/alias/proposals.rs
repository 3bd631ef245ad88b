//! Alias proposals: generate from the store, curate, apply
//!
//! Generation only ever writes `alias_candidates`. The live mapping table
//! changes only through `apply_accepted`, after a human has set accept
//! flags.

use super::cluster::{build_clusters, Cluster, ClusterOptions, Supported};
use super::form::normalize_text;
use crate::extract::salvage;
use crate::model::{
    AliasCandidate, AliasKind, AliasMapping, ExtractRecord, KeywordCategory, RecordOutcome,
};
use crate::normalize::clean_name;
use crate::storage::{DomainStore, ExtractFilter, StorageResult};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Outcome of one generation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerateReport {
    pub kind: Option<AliasKind>,
    /// Distinct strings fed to the clusterer
    pub corpus: usize,
    pub clusters: usize,
    /// Clusters with more than one member
    pub merges: usize,
    pub candidates: usize,
}

/// Switches for `apply_accepted`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplyOptions {
    /// Report what would change without writing
    pub dry_run: bool,
    /// Apply rows whose accept flag is unset too
    pub include_rejected: bool,
    /// Give every restaurant without a location one named after itself
    pub default_locations: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            include_rejected: false,
            default_locations: true,
        }
    }
}

/// Outcome of one apply run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub dry_run: bool,
    /// Candidate rows considered (after the accept filter)
    pub selected: usize,
    pub identity: usize,
    /// New or changed alias mappings
    pub mappings: usize,
    /// Existing mappings repointed to a new canonical
    pub repointed: usize,
    pub cycles_refused: usize,
    pub locations: usize,
    pub existing_locations: usize,
    pub missing_restaurants: usize,
    pub default_locations: usize,
}

// === Generation ===

/// Strings to cluster for one kind, grouped by keyword category.
///
/// Dish and restaurant corpora come back as a single `None` group.
pub fn collect_corpus(
    store: &dyn DomainStore,
    kind: AliasKind,
) -> StorageResult<Vec<(Option<KeywordCategory>, Vec<Supported>)>> {
    let to_supported = |rows: Vec<(String, i64)>| -> Vec<Supported> {
        rows.into_iter()
            .map(|(text, support)| Supported::new(text, support))
            .collect()
    };

    match kind {
        AliasKind::Dish => Ok(vec![(None, to_supported(store.dish_name_support()?))]),
        AliasKind::Keyword => {
            let mut groups = Vec::new();
            for category in KeywordCategory::ALL {
                groups.push((Some(category), to_supported(store.keyword_support(category)?)));
            }
            Ok(groups)
        }
        AliasKind::Restaurant => Ok(vec![(None, restaurant_corpus(store)?)]),
    }
}

/// Raw restaurant names as the model wrote them, counted over every
/// valid record of all salvageable extracts.
fn restaurant_corpus(store: &dyn DomainStore) -> StorageResult<Vec<Supported>> {
    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for extract in store.list_extracts(&ExtractFilter::new())? {
        for value in salvage(&extract.data_extract).records {
            let RecordOutcome::Ok(record) = ExtractRecord::from_value(&value, None) else {
                continue;
            };
            let name = clean_name(&record.restaurant);
            if !name.is_empty() {
                *counts.entry(name).or_insert(0) += 1;
            }
        }
    }
    Ok(counts
        .into_iter()
        .map(|(name, support)| Supported::new(name, support))
        .collect())
}

/// The branch part of `raw` when it is `canonical` followed by more
/// words. Words are compared on their normalized text; the returned
/// suffix keeps the raw spelling.
pub fn split_location(canonical: &str, raw: &str) -> Option<String> {
    let canonical_words: Vec<&str> = canonical.split_whitespace().collect();
    let raw_words: Vec<&str> = raw.split_whitespace().collect();
    if canonical_words.is_empty() || raw_words.len() <= canonical_words.len() {
        return None;
    }
    let same_prefix = canonical_words
        .iter()
        .zip(&raw_words)
        .all(|(c, r)| normalize_text(c) == normalize_text(r));
    if !same_prefix {
        return None;
    }
    let suffix = raw_words[canonical_words.len()..].join(" ");
    if normalize_text(&suffix).is_empty() {
        return None;
    }
    Some(suffix)
}

fn cluster_rows(
    kind: AliasKind,
    cluster_id: i64,
    category: Option<KeywordCategory>,
    cluster: &Cluster,
) -> Vec<AliasCandidate> {
    cluster
        .members
        .iter()
        .map(|member| AliasCandidate {
            kind,
            cluster_id,
            category,
            canonical: cluster.canonical.clone(),
            member: member.text.clone(),
            support: member.support,
            location_name: match kind {
                AliasKind::Restaurant => split_location(&cluster.canonical, &member.text),
                _ => None,
            },
            proposed: true,
            accept: false,
        })
        .collect()
}

/// Cluster the corpus for `kind` and replace its proposals.
///
/// Cluster ids are numbered from 1 across all categories of a run.
pub fn generate(
    store: &dyn DomainStore,
    kind: AliasKind,
    options: &ClusterOptions,
) -> StorageResult<GenerateReport> {
    let mut report = GenerateReport {
        kind: Some(kind),
        ..GenerateReport::default()
    };
    let mut candidates = Vec::new();
    let mut next_id = 1i64;

    for (category, corpus) in collect_corpus(store, kind)? {
        report.corpus += corpus.len();
        let clusters = build_clusters(&corpus, options);
        debug!(
            %kind,
            category = category.map(|c| c.as_str()).unwrap_or("-"),
            strings = corpus.len(),
            clusters = clusters.len(),
            "clustered corpus"
        );
        for cluster in &clusters {
            if cluster.members.len() > 1 {
                report.merges += 1;
            }
            candidates.extend(cluster_rows(kind, next_id, category, cluster));
            next_id += 1;
        }
        report.clusters += clusters.len();
    }

    report.candidates = candidates.len();
    store.replace_alias_candidates(kind, &candidates)?;
    info!(
        %kind,
        corpus = report.corpus,
        clusters = report.clusters,
        merges = report.merges,
        candidates = report.candidates,
        "generated alias proposals"
    );
    Ok(report)
}

// === Curation ===

/// Mark a whole cluster, or one member of it, accepted or rejected.
/// Returns the number of candidate rows changed.
pub fn set_accept(
    store: &dyn DomainStore,
    kind: AliasKind,
    cluster_id: i64,
    member: Option<&str>,
    accept: bool,
) -> StorageResult<usize> {
    let changed = store.set_candidate_accept(kind, cluster_id, member, accept)?;
    if changed == 0 {
        warn!(%kind, cluster_id, member = member.unwrap_or("*"), "no candidate rows matched");
    }
    Ok(changed)
}

// === Apply ===

/// Follow `name` through the mapping to its final canonical. `None` when
/// the existing chain loops.
fn resolve(map: &HashMap<String, String>, name: &str) -> Option<String> {
    let mut seen = HashSet::new();
    let mut current = name.to_string();
    while let Some(next) = map.get(&current) {
        if !seen.insert(current.clone()) {
            return None;
        }
        current = next.clone();
    }
    Some(current)
}

/// Merge curated proposals into the live alias table.
///
/// Identity rows are skipped. Targets are flattened through existing
/// mappings so every alias points at a final canonical, and a merge that
/// would close a cycle is refused. Mappings that pointed at a member now
/// point at its new canonical. Restaurant rows with a location name also
/// record that branch under the canonical restaurant.
pub fn apply_accepted(
    store: &dyn DomainStore,
    kind: AliasKind,
    options: ApplyOptions,
) -> StorageResult<ApplyReport> {
    let mut report = ApplyReport {
        dry_run: options.dry_run,
        ..ApplyReport::default()
    };

    let mut map: HashMap<String, String> = store
        .load_alias_mappings(kind)?
        .into_iter()
        .map(|m| (m.alias, m.canonical))
        .collect();
    let mut changed: BTreeMap<String, String> = BTreeMap::new();
    let mut locations: Vec<(String, String)> = Vec::new();

    let selected: Vec<AliasCandidate> = store
        .list_alias_candidates(kind)?
        .into_iter()
        .filter(|c| c.accept || options.include_rejected)
        .collect();
    report.selected = selected.len();

    for candidate in &selected {
        if let Some(location) = &candidate.location_name {
            locations.push((candidate.canonical.clone(), location.clone()));
        }
        if candidate.is_identity() {
            report.identity += 1;
            continue;
        }

        let Some(target) = resolve(&map, &candidate.canonical) else {
            warn!(%kind, canonical = %candidate.canonical, "existing alias chain loops");
            report.cycles_refused += 1;
            continue;
        };
        if target == candidate.member {
            debug!(%kind, member = %candidate.member, "refused cyclic alias");
            report.cycles_refused += 1;
            continue;
        }
        if map.get(&candidate.member) == Some(&target) {
            continue;
        }

        map.insert(candidate.member.clone(), target.clone());
        changed.insert(candidate.member.clone(), target.clone());
        report.mappings += 1;

        let stale: Vec<String> = map
            .iter()
            .filter(|(_, canonical)| **canonical == candidate.member)
            .map(|(alias, _)| alias.clone())
            .collect();
        for alias in stale {
            map.insert(alias.clone(), target.clone());
            changed.insert(alias, target.clone());
            report.repointed += 1;
        }
    }

    if !options.dry_run {
        for (alias, canonical) in &changed {
            store.upsert_alias_mapping(&AliasMapping::new(kind, alias.as_str(), canonical.as_str()))?;
        }
    }

    if kind == AliasKind::Restaurant {
        apply_locations(store, &map, &locations, options, &mut report)?;
    }

    info!(
        %kind,
        dry_run = options.dry_run,
        selected = report.selected,
        mappings = report.mappings,
        repointed = report.repointed,
        cycles_refused = report.cycles_refused,
        locations = report.locations,
        default_locations = report.default_locations,
        "applied alias proposals"
    );
    Ok(report)
}

fn apply_locations(
    store: &dyn DomainStore,
    map: &HashMap<String, String>,
    locations: &[(String, String)],
    options: ApplyOptions,
    report: &mut ApplyReport,
) -> StorageResult<()> {
    let mut planned: HashSet<(i64, String)> = HashSet::new();
    for (canonical, location) in locations {
        let name = resolve(map, canonical).unwrap_or_else(|| canonical.clone());
        let Some(restaurant_id) = store.find_restaurant(&name)? else {
            debug!(restaurant = %name, "no restaurant for location");
            report.missing_restaurants += 1;
            continue;
        };
        if store.has_restaurant_location(restaurant_id, location)?
            || !planned.insert((restaurant_id.0, location.clone()))
        {
            report.existing_locations += 1;
            continue;
        }
        if !options.dry_run {
            store.insert_restaurant_location(restaurant_id, location)?;
        }
        report.locations += 1;
    }

    if options.default_locations {
        for (restaurant_id, name) in store.restaurants_without_locations()? {
            if planned.iter().any(|(id, _)| *id == restaurant_id.0) {
                continue;
            }
            if !options.dry_run {
                store.insert_restaurant_location(restaurant_id, &name)?;
            }
            report.default_locations += 1;
        }
    }
    Ok(())
}
