// # Eviction Policy
//
// Deterministic LRU: while a tier exceeds its count or size limit, evict
// the single eldest entry under strict `(timestamp asc, key asc)` order,
// one at a time, so the victim sequence is well-defined for cascading
// removal and statistics. Shared by both tiers (see `cache::query_cache`'s
// `evict_lru_entry` in the lineage this crate generalizes from, which did
// the same loop separately per-tier).

/// A tier's current occupancy, reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub count: u64,
    pub total_size: u64,
}

/// A tier's configured limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_count: u64,
    pub max_size: u64,
}

impl Occupancy {
    fn over_limit(&self, limits: &Limits) -> bool {
        self.count > limits.max_count || self.total_size > limits.max_size
    }
}

/// Candidate entry supplied by a tier for eviction consideration, ordered
/// by `(timestamp, key)`.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub key: String,
    pub timestamp: f64,
    pub size: u64,
}

/// Given the current occupancy, limits, and an oldest-first candidate list
/// (already sorted by `(timestamp asc, key asc)`), return the prefix of
/// candidates to evict so the tier satisfies both limits. The caller is
/// responsible for actually removing each returned victim and must have
/// supplied a candidate list covering every entry in the tier — the
/// returned prefix can never exceed it.
pub fn select_victims(mut occupancy: Occupancy, limits: Limits, candidates: &[Candidate]) -> Vec<Candidate> {
    let mut victims = Vec::new();

    for candidate in candidates {
        if !occupancy.over_limit(&limits) {
            break;
        }
        occupancy.count = occupancy.count.saturating_sub(1);
        occupancy.total_size = occupancy.total_size.saturating_sub(candidate.size);
        victims.push(candidate.clone());
    }

    victims
}
