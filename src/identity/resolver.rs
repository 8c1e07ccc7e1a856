use serde::Serialize;
use tracing::{debug, warn};

use super::cache::IdentityCache;
use super::lookup::IdentityLookup;
use crate::error::CacheError;
use crate::models::MpIdentity;
use crate::text::{name_similarity, normalize_mp_name};

/// Configuration for identity resolution
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Minimum similarity for a cached name to stand in for a new one
    pub fuzzy_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.85,
        }
    }
}

/// Which tier answered a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Exact,
    Fuzzy,
    External,
    NotFound,
    LookupFailed,
    /// Name was empty after normalization; nothing cached
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub exact_hits: usize,
    pub fuzzy_hits: usize,
    pub external_hits: usize,
    pub negative_results: usize,
    pub lookup_failures: usize,
}

/// Resolves speaker names to party and terms: exact cache hit, then
/// fuzzy cache hit, then the external lookup. Every answer that is not an
/// exact hit is written back under the normalized name, so a name costs at
/// most one external lookup over the life of the table.
pub struct IdentityResolver<L> {
    cache: IdentityCache,
    lookup: L,
    config: ResolverConfig,
    stats: ResolverStats,
}

impl<L: IdentityLookup> IdentityResolver<L> {
    pub fn new(cache: IdentityCache, lookup: L, config: ResolverConfig) -> Self {
        Self {
            cache,
            lookup,
            config,
            stats: ResolverStats::default(),
        }
    }

    pub async fn resolve(&mut self, raw_name: &str) -> MpIdentity {
        self.resolve_with_source(raw_name).await.0
    }

    pub async fn resolve_with_source(&mut self, raw_name: &str) -> (MpIdentity, Resolution) {
        let name = normalize_mp_name(raw_name);
        if name.is_empty() {
            return (MpIdentity::unknown(), Resolution::Empty);
        }

        if let Some(identity) = self.cache.get(&name) {
            self.stats.exact_hits += 1;
            return (identity.clone(), Resolution::Exact);
        }

        if let Some((matched, score)) = self.best_fuzzy_match(&name) {
            if let Some(identity) = self.cache.get(&matched).cloned() {
                debug!("Fuzzy identity match {:?} -> {:?} ({:.3})", name, matched, score);
                self.cache.insert_new(&name, identity.clone());
                self.stats.fuzzy_hits += 1;
                return (identity, Resolution::Fuzzy);
            }
        }

        let (identity, resolution) = match self.lookup.lookup(&name).await {
            Ok(Some(identity)) => {
                self.stats.external_hits += 1;
                (identity, Resolution::External)
            }
            Ok(None) => {
                self.stats.negative_results += 1;
                (MpIdentity::unknown(), Resolution::NotFound)
            }
            Err(e) => {
                warn!("Identity lookup failed for {:?}: {}", name, e);
                self.stats.lookup_failures += 1;
                (MpIdentity::unknown(), Resolution::LookupFailed)
            }
        };

        self.cache.insert_new(&name, identity.clone());
        (identity, resolution)
    }

    /// Highest-scoring cached name at or above the threshold; the first in
    /// table order wins a tie.
    fn best_fuzzy_match(&self, name: &str) -> Option<(String, f64)> {
        let mut best: Option<(&str, f64)> = None;

        for (candidate, _) in self.cache.iter() {
            let score = name_similarity(name, candidate);
            if score < self.config.fuzzy_threshold {
                continue;
            }
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((candidate, score));
            }
        }

        best.map(|(candidate, score)| (candidate.to_string(), score))
    }

    pub fn stats(&self) -> &ResolverStats {
        &self.stats
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Persist the identity table
    pub fn save(&self) -> Result<(), CacheError> {
        self.cache.save()
    }
}
