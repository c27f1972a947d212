//! Call history cache
//!
//! Pages fetched from the history service, kept until a call made from a
//! matching number ends.

use crate::domain::history::{HistoryFilters, HistoryPage, HistoryQuery};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub struct CallHistoryCache {
    pages: HashMap<HistoryQuery, HistoryPage>,
    page_size: u32,
    /// Bumped on every invalidation; fetches started earlier are not stored
    generation: u64,
}

impl CallHistoryCache {
    pub fn new(page_size: u32) -> Self {
        Self {
            pages: HashMap::new(),
            page_size,
            generation: 0,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, query: &HistoryQuery) -> Option<&HistoryPage> {
        self.pages.get(query)
    }

    /// Store a fetched page unless the cache was invalidated since the fetch began
    pub fn store(&mut self, generation: u64, query: HistoryQuery, page: HistoryPage) -> bool {
        if generation != self.generation {
            debug!("Discarding history page fetched before the last invalidation");
            return false;
        }
        self.pages.insert(query, page);
        true
    }

    /// Drop every page a call from `number` could appear on and return the
    /// first-page queries to re-fetch.
    pub fn invalidate(&mut self, number: &str) -> Vec<HistoryQuery> {
        self.generation += 1;

        let mut filters: HashSet<HistoryFilters> = HashSet::new();
        self.pages.retain(|query, _| {
            if query.covers_number(number) {
                filters.insert(query.filters.clone());
                false
            } else {
                true
            }
        });

        if filters.is_empty() {
            filters.insert(HistoryFilters::default());
        }

        let mut refetch: Vec<HistoryQuery> = filters
            .into_iter()
            .map(|filters| HistoryQuery::first_page(filters, self.page_size))
            .collect();
        refetch.sort_by(|a, b| a.filters.number.cmp(&b.filters.number));
        debug!("Invalidated history for {}; re-fetching {} page(s)", number, refetch.len());
        refetch
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
