use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{PipelineError, RemoteError};
use crate::model::Record;
use crate::notion::model::{DatabaseQuery, Predicate, Sort};
use crate::notion::NotionService;
use crate::retry::RetryPolicy;

/// Lazily issues one page request per `next_page` call. Pages are strictly
/// sequential since each cursor comes from the previous response. Once the
/// source reports no further pages the paginator is exhausted for good.
pub struct RecordPaginator {
    notion: Arc<dyn NotionService>,
    retry: RetryPolicy,
    query: DatabaseQuery,
    exhausted: bool,
    pages_fetched: usize,
}

impl RecordPaginator {
    pub fn new(
        notion: Arc<dyn NotionService>,
        retry: RetryPolicy,
        database_id: impl Into<String>,
        filter: Vec<Predicate>,
        sort: Sort,
        page_size: usize,
    ) -> Self {
        Self {
            notion,
            retry,
            query: DatabaseQuery {
                database_id: database_id.into(),
                filter,
                sorts: vec![sort],
                page_size,
                start_cursor: None,
            },
            exhausted: false,
            pages_fetched: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next page; `None` once the source has no more pages.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Record>>, RemoteError> {
        if self.exhausted {
            return Ok(None);
        }
        let notion = &self.notion;
        let query = &self.query;
        let page = self
            .retry
            .run("notion.query", move || notion.query_database(query))
            .await?;
        self.pages_fetched += 1;
        debug!(
            page = self.pages_fetched,
            records = page.results.len(),
            has_more = page.has_more,
            "fetched page"
        );

        match page.next_cursor.filter(|_| page.has_more) {
            Some(cursor) => self.query.start_cursor = Some(cursor),
            None => self.exhausted = true,
        }
        Ok(Some(page.results))
    }

    /// Drain pages until the source is exhausted or `limit` records are in
    /// hand. Any failed page discards everything fetched so far.
    pub async fn collect(mut self, limit: Option<usize>) -> Result<Vec<Record>, PipelineError> {
        let mut records = Vec::new();
        while !self.is_exhausted() {
            let Some(page) = self
                .next_page()
                .await
                .map_err(PipelineError::UpstreamQuery)?
            else {
                break;
            };
            records.extend(page);
            if limit.is_some_and(|cap| records.len() >= cap) {
                break;
            }
        }
        if let Some(cap) = limit {
            records.truncate(cap);
        }
        info!(
            records = records.len(),
            pages = self.pages_fetched,
            exhausted = self.is_exhausted(),
            "pagination finished"
        );
        Ok(records)
    }
}
