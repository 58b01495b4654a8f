//! Span helpers for the `tracing` feature.
//!
//! The crate only creates spans; installing a subscriber is left to the
//! application.

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    /// Longest statement prefix recorded on a span.
    const SQL_PREVIEW_LEN: usize = 120;

    fn preview(sql: &str) -> &str {
        match sql.char_indices().nth(SQL_PREVIEW_LEN) {
            Some((idx, _)) => &sql[..idx],
            None => sql,
        }
    }

    pub fn execute_query_span(sql: &str) -> Span {
        tracing::debug_span!("quarry.execute", sql = preview(sql))
    }

    pub fn transaction_span() -> Span {
        tracing::debug_span!("quarry.transaction")
    }

    pub fn find_span(table: &str) -> Span {
        tracing::debug_span!("quarry.find", table)
    }

    pub fn connect_span() -> Span {
        tracing::info_span!("quarry.connect")
    }

    pub fn migration_span(name: &str, direction: &'static str) -> Span {
        tracing::info_span!("quarry.migration", name, direction)
    }

}
