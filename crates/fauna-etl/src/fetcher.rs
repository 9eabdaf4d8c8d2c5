//! Paginated listing fetcher
//!
//! Walks the upstream listing endpoint page by page and emits a lazy,
//! finite, non-restartable sequence of record identifiers. Pages are
//! requested sequentially from page 1; the walk stops on an empty page or
//! when the reported last page has been consumed. Each page request is
//! wrapped by the backoff policy; once a page gives up, the stream
//! terminates with `PageFetch` naming the page.

use crate::backoff::{retry, BackoffPolicy};
use crate::client::ApiClient;
use crate::error::{EtlError, Result};
use crate::events::EventBus;
use crate::models::RecordId;
use futures::stream::Stream;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fetcher for the paginated listing endpoint
pub struct PageFetcher {
    client: Arc<ApiClient>,
    policy: BackoffPolicy,
    cancel: CancellationToken,
    events: EventBus,
}

struct WalkState {
    fetcher: PageFetcher,
    page: u32,
    pending: VecDeque<RecordId>,
    done: bool,
}

impl PageFetcher {
    pub fn new(
        client: Arc<ApiClient>,
        policy: BackoffPolicy,
        cancel: CancellationToken,
        events: EventBus,
    ) -> Self {
        Self {
            client,
            policy,
            cancel,
            events,
        }
    }

    /// Consume the fetcher into a lazy stream of record identifiers
    ///
    /// Identifiers are yielded in page order, then in-page order. The
    /// stream is finite and cannot be restarted; on a page failure it
    /// yields the error and ends.
    pub fn into_id_stream(self) -> impl Stream<Item = Result<RecordId>> {
        let state = WalkState {
            fetcher: self,
            page: 1,
            pending: VecDeque::new(),
            done: false,
        };

        futures::stream::try_unfold(state, |mut state| async move {
            loop {
                if let Some(id) = state.pending.pop_front() {
                    return Ok(Some((id, state)));
                }

                if state.done {
                    return Ok(None);
                }

                let page = state.page;
                let listing = state.fetcher.fetch_page(page).await.map_err(|e| {
                    EtlError::PageFetch {
                        page,
                        source: Box::new(e),
                    }
                })?;

                if listing.items.is_empty() {
                    state.done = true;
                    continue;
                }

                state.fetcher.events.info(format!(
                    "Page {}/{}: found {} records",
                    page,
                    listing
                        .total_pages
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    listing.items.len()
                ));

                state
                    .pending
                    .extend(listing.items.into_iter().map(|item| item.id));

                if matches!(listing.total_pages, Some(total) if page >= total) {
                    state.done = true;
                }
                state.page += 1;
            }
        })
    }

    async fn fetch_page(&self, page: u32) -> Result<crate::models::ListingPage> {
        let label = format!("page {} fetch", page);
        retry(&self.policy, &self.cancel, &self.events, &label, || {
            self.client.fetch_page(page)
        })
        .await
    }
}
