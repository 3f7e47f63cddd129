//! Rank catalog: the fixed, totally ordered rank hierarchy.

use std::collections::HashSet;

use muster_core::models::rank::Rank;

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Ordered rank table with a merit-tier boundary.
///
/// Holds at least one rank, sorted ascending by order. Order `0` is never
/// assigned; it is what [`order_of`](Self::order_of) reports for names the
/// catalog does not know.
#[derive(Debug, Clone)]
pub struct RankCatalog {
    ranks: Vec<Rank>,
    merit_boundary: u32,
}

impl RankCatalog {
    /// Build a catalog, validating uniqueness of names and orders.
    pub fn new(mut ranks: Vec<Rank>, merit_boundary_rank: &str) -> Result<Self, EngineError> {
        if ranks.is_empty() {
            return Err(EngineError::EmptyCatalog);
        }

        let mut names = HashSet::new();
        let mut orders = HashSet::new();
        for rank in &ranks {
            if rank.order == 0 {
                return Err(EngineError::ReservedRankOrder(rank.name.clone()));
            }
            if !names.insert(rank.name.as_str()) {
                return Err(EngineError::DuplicateRankName(rank.name.clone()));
            }
            if !orders.insert(rank.order) {
                return Err(EngineError::DuplicateRankOrder(rank.order));
            }
        }

        ranks.sort_by_key(|r| r.order);

        let merit_boundary = ranks
            .iter()
            .find(|r| r.name == merit_boundary_rank)
            .map(|r| r.order)
            .ok_or_else(|| EngineError::UnknownMeritBoundary(merit_boundary_rank.to_string()))?;

        Ok(Self {
            ranks,
            merit_boundary,
        })
    }

    /// Build the catalog described by `config.ranks` and `config.merit_boundary`.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        Self::new(config.ranks.clone(), &config.merit_boundary)
    }

    /// Look up a rank by exact name.
    pub fn rank_of(&self, name: &str) -> Option<&Rank> {
        self.ranks.iter().find(|r| r.name == name)
    }

    /// Order of the named rank, or `0` (below the lowest rank) when the
    /// name is unknown.
    pub fn order_of(&self, name: &str) -> u32 {
        self.rank_of(name).map(|r| r.order).unwrap_or(0)
    }

    /// Every rank, highest order first.
    pub fn all_ranks_descending(&self) -> impl Iterator<Item = &Rank> {
        self.ranks.iter().rev()
    }

    /// Whether `name` sits at or above the merit boundary. Unknown names
    /// are never merit ranks.
    pub fn is_merit_rank(&self, name: &str) -> bool {
        self.order_of(name) >= self.merit_boundary
    }

    /// Order of the first merit rank.
    pub fn merit_boundary(&self) -> u32 {
        self.merit_boundary
    }

    /// The rank with the smallest order.
    pub fn lowest(&self) -> &Rank {
        &self.ranks[0]
    }

    /// The rank with the largest order.
    pub fn highest(&self) -> &Rank {
        &self.ranks[self.ranks.len() - 1]
    }

    /// The rank with the next higher order, or `None` at the top.
    pub fn next_above(&self, name: &str) -> Option<&Rank> {
        let order = self.order_of(name);
        self.ranks.iter().find(|r| r.order > order)
    }

    /// Number of ranks in the catalog.
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}
