//! Query logging.

use std::time::Instant;

/// Records one query execution and emits a summary when finished.
pub(crate) struct QueryLogger<'q> {
    query: &'q str,
    rows_returned: u64,
    start: Instant,
}

impl<'q> QueryLogger<'q> {
    pub(crate) fn new(query: &'q str) -> Self {
        log::debug!(target: "ogma::query", "running query {query}");
        QueryLogger { query, rows_returned: 0, start: Instant::now() }
    }

    pub(crate) fn returned_rows(&mut self, count: u64) {
        self.rows_returned = count;
    }

    pub(crate) fn finish(self) {
        // summary is emitted on drop
    }
}

impl Drop for QueryLogger<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let summary = self
            .query
            .lines()
            .next()
            .unwrap_or_default();
        log::trace!(
            target: "ogma::query",
            "{summary} …; rows returned: {}, elapsed: {:.3?}",
            self.rows_returned,
            elapsed,
        );
    }
}
