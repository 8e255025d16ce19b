use indexmap::IndexSet;

/// Bounded least-recently-used set of connected tool servers
///
/// Iteration order runs from least to most recently used, so index 0 is
/// always the next eviction candidate.
#[derive(Debug, Clone)]
pub struct ToolCache {
    entries: IndexSet<String>,
    max_size: usize,
}

impl ToolCache {
    /// Create an empty cache holding at most `max_size` servers (minimum 1)
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: IndexSet::with_capacity(max_size),
            max_size,
        }
    }

    /// Insert servers in order, refreshing ones already present
    ///
    /// Ids added by one call never evict each other: when a batch holds more
    /// than `max_size` distinct ids only the last `max_size` are inserted.
    /// Returns the identifiers evicted to make room, oldest first.
    pub fn add<I, S>(&mut self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut batch: IndexSet<String> = IndexSet::new();
        for id in ids {
            let id = id.into();
            batch.shift_remove(&id);
            batch.insert(id);
        }

        let skipped = batch.len().saturating_sub(self.max_size);
        if skipped > 0 {
            tracing::debug!(skipped, "batch larger than tool cache");
        }

        for id in batch.into_iter().skip(skipped) {
            match self.entries.get_index_of(&id) {
                Some(index) => self.promote(index),
                None => {
                    self.entries.insert(id);
                }
            }
        }

        // the batch now sits at the back, so only older entries are evicted
        let overflow = self.entries.len().saturating_sub(self.max_size);
        let evicted: Vec<String> = self.entries.drain(..overflow).collect();
        for id in &evicted {
            tracing::debug!(server = %id, "evicted from tool cache");
        }

        evicted
    }

    /// Mark a server as just used; unknown ids are ignored
    pub fn touch(&mut self, id: &str) {
        if let Some(index) = self.entries.get_index_of(id) {
            self.promote(index);
        }
    }

    /// Drop a server; returns whether it was present
    pub fn remove(&mut self, id: &str) -> bool {
        self.entries.shift_remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains(id)
    }

    /// Cached ids, least recently used first
    pub fn get_all(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    fn promote(&mut self, index: usize) {
        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
    }
}
