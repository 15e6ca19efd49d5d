//! Paginated customer search with a de-duplicated, growing result set.

use super::{require_credentials, ResolveError};
use crate::config::CredentialsProvider;
use crate::store::{Customer, PageRequest, StoreApi, StoreError, PAGE_SIZE};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// `Idle → Searching → {Populated | Empty | Errored}`; `load_more` goes back through `Searching`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchPhase {
    #[default]
    Idle,
    Searching,
    Populated,
    Empty,
    Errored,
}

/// Identifies the query and page a fetch was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    generation: u64,
    query: String,
    page: u32,
}

impl SearchTicket {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn page(&self) -> u32 {
        self.page
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A page was merged; `added` counts customers that were not already present.
    Page { added: usize, has_more: bool },
    /// The first page came back empty.
    NotFound { query: String },
    /// Nothing to fetch: empty query, or no further pages.
    Skipped,
    /// The query changed while this fetch was in flight; its result was dropped.
    Superseded,
}

/// Accumulated results for one search session.
#[derive(Debug, Clone)]
pub struct SearchAccumulator {
    query: String,
    page: u32,
    merged: u32,
    results: Vec<Customer>,
    seen: HashSet<u64>,
    has_more: bool,
    error: Option<ResolveError>,
    phase: SearchPhase,
    generation: u64,
}

impl Default for SearchAccumulator {
    fn default() -> Self {
        Self {
            query: String::new(),
            page: 1,
            merged: 0,
            results: Vec::new(),
            seen: HashSet::new(),
            has_more: false,
            error: None,
            phase: SearchPhase::Idle,
            generation: 0,
        }
    }
}

impl SearchAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Current page of the session: 1 from the moment a search starts, then the last page merged.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Customers in arrival order, unique by id.
    pub fn results(&self) -> &[Customer] {
        &self.results
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn error(&self) -> Option<&ResolveError> {
        self.error.as_ref()
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    /// Start a new search: clears prior results and resets to page 1.
    /// A blank query just resets to `Idle` and returns None.
    pub fn begin_search(&mut self, query: &str) -> Option<SearchTicket> {
        self.generation += 1;
        self.query = query.trim().to_string();
        self.page = 1;
        self.merged = 0;
        self.results.clear();
        self.seen.clear();
        self.has_more = false;
        self.error = None;
        if self.query.is_empty() {
            self.phase = SearchPhase::Idle;
            return None;
        }
        self.phase = SearchPhase::Searching;
        Some(self.ticket(1))
    }

    /// Ask for the next page. None unless results are showing and the last page was full.
    /// After a failed load-more the same page is asked for again.
    pub fn begin_load_more(&mut self) -> Option<SearchTicket> {
        let resumable = matches!(self.phase, SearchPhase::Populated | SearchPhase::Errored)
            && !self.results.is_empty();
        if !resumable || !self.has_more {
            return None;
        }
        self.phase = SearchPhase::Searching;
        self.error = None;
        Some(self.ticket(self.merged + 1))
    }

    fn ticket(&self, page: u32) -> SearchTicket {
        SearchTicket {
            generation: self.generation,
            query: self.query.clone(),
            page,
        }
    }

    fn is_current(&self, ticket: &SearchTicket) -> bool {
        self.phase == SearchPhase::Searching
            && ticket.generation == self.generation
            && ticket.query == self.query
    }

    /// Merge a fetched page, dropping customers whose id is already present.
    pub fn apply_page(&mut self, ticket: &SearchTicket, customers: Vec<Customer>) -> SearchOutcome {
        if !self.is_current(ticket) {
            log::debug!("search: discarding page {} for stale query {:?}", ticket.page, ticket.query);
            return SearchOutcome::Superseded;
        }
        self.has_more = customers.len() == PAGE_SIZE as usize;
        if customers.is_empty() && ticket.page == 1 {
            self.phase = SearchPhase::Empty;
            self.page = 1;
            self.merged = 1;
            self.results.clear();
            self.seen.clear();
            return SearchOutcome::NotFound {
                query: self.query.clone(),
            };
        }
        let before = self.results.len();
        for customer in customers {
            if self.seen.insert(customer.id) {
                self.results.push(customer);
            } else {
                log::debug!("search: dropping duplicate customer {}", customer.id);
            }
        }
        self.page = ticket.page;
        self.merged = ticket.page;
        self.phase = SearchPhase::Populated;
        SearchOutcome::Page {
            added: self.results.len() - before,
            has_more: self.has_more,
        }
    }

    /// Record a failed fetch. Results already accumulated stay. Returns false for stale tickets.
    pub fn apply_error(&mut self, ticket: &SearchTicket, error: ResolveError) -> bool {
        if !self.is_current(ticket) {
            log::debug!("search: discarding error for stale query {:?}: {}", ticket.query, error);
            return false;
        }
        self.error = Some(error);
        self.phase = SearchPhase::Errored;
        true
    }
}

fn classify(e: StoreError) -> ResolveError {
    match e.status() {
        Some(status) => ResolveError::Http { status },
        None => ResolveError::Unknown(e.to_string()),
    }
}

/// Search view: paginated customer search by email.
pub struct SearchView {
    store: Arc<dyn StoreApi>,
    credentials: Arc<dyn CredentialsProvider>,
    state: Mutex<SearchAccumulator>,
}

impl SearchView {
    pub fn new(store: Arc<dyn StoreApi>, credentials: Arc<dyn CredentialsProvider>) -> Self {
        Self {
            store,
            credentials,
            state: Mutex::new(SearchAccumulator::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SearchAccumulator> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> SearchAccumulator {
        self.lock().clone()
    }

    /// Start a new search for `query`, replacing any previous results.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome, ResolveError> {
        let ticket = self.lock().begin_search(query);
        match ticket {
            Some(ticket) => self.run(ticket).await,
            None => Ok(SearchOutcome::Skipped),
        }
    }

    /// Fetch the next page and append it. Does nothing when there are no more pages.
    pub async fn load_more(&self) -> Result<SearchOutcome, ResolveError> {
        let ticket = self.lock().begin_load_more();
        match ticket {
            Some(ticket) => self.run(ticket).await,
            None => {
                log::debug!("search: nothing more to load");
                Ok(SearchOutcome::Skipped)
            }
        }
    }

    async fn run(&self, ticket: SearchTicket) -> Result<SearchOutcome, ResolveError> {
        log::info!("search: {:?} page {}", ticket.query(), ticket.page());
        let fetched = match require_credentials(self.credentials.as_ref()) {
            Ok(credentials) => self
                .store
                .customers_by_email(&credentials, ticket.query(), Some(PageRequest::new(ticket.page())))
                .await
                .map_err(|e| {
                    log::warn!("search: {:?} page {} failed: {}", ticket.query(), ticket.page(), e);
                    classify(e)
                }),
            Err(e) => Err(e),
        };

        let mut acc = self.lock();
        match fetched {
            Ok(customers) => Ok(acc.apply_page(&ticket, customers)),
            Err(e) => {
                if acc.apply_error(&ticket, e.clone()) {
                    Err(e)
                } else {
                    Ok(SearchOutcome::Superseded)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, CredentialsProvider};
    use crate::store::testing::{credentials, customer, http_error, Call, FakeStore, GatedStore};
    use crate::store::StoreError;

    fn page(ids: impl IntoIterator<Item = u64>) -> Vec<Customer> {
        ids.into_iter().map(customer).collect()
    }

    fn view(store: Arc<FakeStore>) -> SearchView {
        SearchView::new(store, Arc::new(|| Some(credentials())))
    }

    fn ids(acc: &SearchAccumulator) -> Vec<u64> {
        acc.results().iter().map(|c| c.id).collect()
    }

    #[tokio::test]
    async fn overlapping_pages_are_deduplicated() {
        let store = Arc::new(FakeStore::default());
        store.push_customers(Ok(page(1..=20)));
        store.push_customers(Ok(page([21, 22, 5, 23, 24])));
        let view = view(store.clone());

        assert_eq!(
            view.search("shop.example").await,
            Ok(SearchOutcome::Page {
                added: 20,
                has_more: true
            })
        );
        assert_eq!(
            view.load_more().await,
            Ok(SearchOutcome::Page {
                added: 4,
                has_more: false
            })
        );
        let acc = view.snapshot();
        assert_eq!(acc.results().len(), 24);
        assert!(!acc.has_more());
        assert_eq!(acc.page(), 2);
        assert_eq!(&ids(&acc)[18..], &[19, 20, 21, 22, 23, 24]);

        assert_eq!(view.load_more().await, Ok(SearchOutcome::Skipped));
        assert_eq!(store.calls().len(), 2);
        assert_eq!(
            store.calls()[1],
            Call::Customers {
                email: "shop.example".to_string(),
                page: Some(PageRequest { page: 2, per_page: 20 })
            }
        );
    }

    #[tokio::test]
    async fn empty_first_page_is_not_found() {
        let store = Arc::new(FakeStore::default());
        let view = view(store);
        assert_eq!(
            view.search(" a@b.com ").await,
            Ok(SearchOutcome::NotFound {
                query: "a@b.com".to_string()
            })
        );
        let acc = view.snapshot();
        assert_eq!(acc.phase(), SearchPhase::Empty);
        assert!(acc.results().is_empty());
        assert!(acc.error().is_none());
        assert_eq!(view.load_more().await, Ok(SearchOutcome::Skipped));
    }

    #[tokio::test]
    async fn empty_later_page_ends_pagination() {
        let store = Arc::new(FakeStore::default());
        store.push_customers(Ok(page(1..=20)));
        store.push_customers(Ok(vec![]));
        let view = view(store);
        view.search("x").await.unwrap();
        assert_eq!(
            view.load_more().await,
            Ok(SearchOutcome::Page {
                added: 0,
                has_more: false
            })
        );
        let acc = view.snapshot();
        assert_eq!(acc.phase(), SearchPhase::Populated);
        assert_eq!(acc.results().len(), 20);
    }

    #[tokio::test]
    async fn new_query_resets_results_and_page() {
        let store = Arc::new(FakeStore::default());
        store.push_customers(Ok(page(1..=20)));
        store.push_customers(Ok(page(1..=20)));
        store.push_customers(Ok(page([100, 101])));
        let view = view(store.clone());
        view.search("a").await.unwrap();
        view.load_more().await.unwrap();

        view.search("b").await.unwrap();
        let acc = view.snapshot();
        assert_eq!(acc.query(), "b");
        assert_eq!(acc.page(), 1);
        assert_eq!(ids(&acc), vec![100, 101]);
        assert_eq!(
            store.calls().last(),
            Some(&Call::Customers {
                email: "b".to_string(),
                page: Some(PageRequest::new(1))
            })
        );
    }

    #[tokio::test]
    async fn failed_load_more_keeps_results_and_retries_same_page() {
        let store = Arc::new(FakeStore::default());
        store.push_customers(Ok(page(1..=20)));
        store.push_customers(Err(http_error(503)));
        store.push_customers(Ok(page([21])));
        let view = view(store.clone());
        view.search("x").await.unwrap();

        assert_eq!(
            view.load_more().await,
            Err(ResolveError::Http { status: 503 })
        );
        let acc = view.snapshot();
        assert_eq!(acc.phase(), SearchPhase::Errored);
        assert_eq!(acc.results().len(), 20);
        assert_eq!(acc.page(), 1);

        view.load_more().await.unwrap();
        let acc = view.snapshot();
        assert_eq!(acc.results().len(), 21);
        assert!(acc.error().is_none());
        let pages: Vec<Option<u32>> = store
            .calls()
            .iter()
            .map(|c| match c {
                Call::Customers { page, .. } => page.map(|p| p.page),
                Call::Orders { .. } => None,
            })
            .collect();
        assert_eq!(pages, vec![Some(1), Some(2), Some(2)]);
    }

    #[tokio::test]
    async fn failure_without_status_is_unknown() {
        let store = Arc::new(FakeStore::default());
        store.push_customers(Err(StoreError::Decode("expected array".to_string())));
        let view = view(store);
        assert!(matches!(
            view.search("x").await,
            Err(ResolveError::Unknown(_))
        ));
        assert_eq!(view.snapshot().phase(), SearchPhase::Errored);
    }

    #[tokio::test]
    async fn missing_configuration_makes_no_request() {
        let store = Arc::new(FakeStore::default());
        let view = SearchView::new(store.clone(), Arc::new(|| -> Option<Credentials> { None }));
        assert_eq!(
            view.search("x").await,
            Err(ResolveError::ConfigurationMissing)
        );
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_idle() {
        let store = Arc::new(FakeStore::default());
        let view = view(store.clone());
        assert_eq!(view.search("   ").await, Ok(SearchOutcome::Skipped));
        assert_eq!(view.snapshot().phase(), SearchPhase::Idle);
        assert!(store.calls().is_empty());
    }

    #[test]
    fn stale_ticket_is_discarded() {
        let mut acc = SearchAccumulator::new();
        let old = acc.begin_search("a").unwrap();
        let new = acc.begin_search("b").unwrap();
        assert_eq!(acc.apply_page(&old, page([1])), SearchOutcome::Superseded);
        assert!(!acc.apply_error(&old, ResolveError::Http { status: 500 }));
        assert!(acc.results().is_empty());
        assert_eq!(acc.phase(), SearchPhase::Searching);

        acc.apply_page(&new, page([2]));
        assert_eq!(ids(&acc), vec![2]);
        assert_eq!(acc.apply_page(&new, page([3])), SearchOutcome::Superseded);
    }

    #[test]
    fn page_is_one_while_first_fetch_is_in_flight() {
        let mut acc = SearchAccumulator::new();
        assert_eq!(acc.page(), 1);
        let first = acc.begin_search("a").unwrap();
        acc.apply_page(&first, page(1..=20));
        let second = acc.begin_load_more().unwrap();
        acc.apply_page(&second, page(21..=40));
        assert_eq!(acc.page(), 2);

        let ticket = acc.begin_search("b").unwrap();
        assert_eq!(acc.page(), 1);
        assert_eq!(ticket.page(), 1);
        assert!(acc.results().is_empty());

        acc.apply_page(&ticket, page(1..=20));
        assert_eq!(acc.begin_load_more().map(|t| t.page()), Some(2));
    }

    #[tokio::test]
    async fn late_response_does_not_overwrite_newer_search() {
        let store = Arc::new(GatedStore::default());
        store.inner.push_customers(Ok(page([2])));
        store.inner.push_customers(Ok(page([1])));
        let provider: Arc<dyn CredentialsProvider> = Arc::new(|| Some(credentials()));
        let view = SearchView::new(store.clone(), provider);

        let slow = view.search("slow");
        let fast = async {
            let outcome = view.search("fast").await;
            store.gate.notify_one();
            outcome
        };
        let (slow, fast) = tokio::join!(slow, fast);

        assert_eq!(slow, Ok(SearchOutcome::Superseded));
        assert!(matches!(fast, Ok(SearchOutcome::Page { added: 1, .. })));
        let acc = view.snapshot();
        assert_eq!(acc.query(), "fast");
        assert_eq!(ids(&acc), vec![2]);
    }
}
