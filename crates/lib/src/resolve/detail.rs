//! Detail resolution: one email to one customer and that customer's orders.

use super::{require_credentials, ResolveError};
use crate::config::CredentialsProvider;
use crate::host::InboundContext;
use crate::store::{Customer, Order, StoreApi};
use std::sync::{Arc, Mutex, MutexGuard};

/// A resolved customer with the first page of their orders, in API order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    pub customer: Customer,
    pub orders: Vec<Order>,
}

/// Result of one detail resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(CustomerRecord),
    /// No customer has this email. Not an error.
    NotFound,
    /// A newer resolution started while this one was in flight; its result was dropped.
    Superseded,
}

/// What the detail view shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailState {
    /// Email of the most recent resolution attempt.
    pub email: Option<String>,
    pub loading: bool,
    pub customer: Option<Customer>,
    pub orders: Vec<Order>,
    pub not_found: bool,
    pub error: Option<ResolveError>,
}

#[derive(Default)]
struct Inner {
    state: DetailState,
    generation: u64,
}

/// Detail view: resolves the current contact's email into a customer and their orders.
pub struct DetailView {
    store: Arc<dyn StoreApi>,
    credentials: Arc<dyn CredentialsProvider>,
    inner: Mutex<Inner>,
}

impl DetailView {
    pub fn new(store: Arc<dyn StoreApi>, credentials: Arc<dyn CredentialsProvider>) -> Self {
        Self {
            store,
            credentials,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> DetailState {
        self.lock().state.clone()
    }

    /// Resolve the contact in `ctx`, unless it is the email already resolved (or resolving).
    /// Returns None when nothing was attempted.
    pub async fn on_context(&self, ctx: &InboundContext) -> Option<Result<Resolution, ResolveError>> {
        let Some(email) = ctx.contact_email() else {
            log::debug!("detail: context has no contact email");
            return None;
        };
        if self.lock().state.email.as_deref() == Some(email) {
            log::debug!("detail: {} already resolved, skipping", email);
            return None;
        }
        Some(self.resolve(email).await)
    }

    /// Re-run the last resolution (explicit user retry).
    pub async fn refresh(&self) -> Option<Result<Resolution, ResolveError>> {
        let email = self.lock().state.email.clone()?;
        Some(self.resolve(&email).await)
    }

    /// Look up `email`: customer first, then that customer's orders. Any failure at either
    /// step clears the displayed customer and reports `SearchFailed`.
    pub async fn resolve(&self, email: &str) -> Result<Resolution, ResolveError> {
        let email = email.trim().to_string();
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.state = DetailState {
                email: Some(email.clone()),
                loading: true,
                ..DetailState::default()
            };
            inner.generation
        };
        log::info!("detail: resolving {}", email);
        let outcome = self.fetch(&email).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            log::debug!("detail: discarding result for superseded lookup of {}", email);
            return Ok(Resolution::Superseded);
        }
        let state = &mut inner.state;
        state.loading = false;
        match outcome {
            Ok(Some(record)) => {
                state.customer = Some(record.customer.clone());
                state.orders = record.orders.clone();
                Ok(Resolution::Found(record))
            }
            Ok(None) => {
                state.not_found = true;
                Ok(Resolution::NotFound)
            }
            Err(e) => {
                state.error = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn fetch(&self, email: &str) -> Result<Option<CustomerRecord>, ResolveError> {
        let credentials = require_credentials(self.credentials.as_ref())?;
        let customers = self
            .store
            .customers_by_email(&credentials, email, None)
            .await
            .map_err(|e| {
                log::warn!("detail: customer query for {} failed: {}", email, e);
                ResolveError::SearchFailed(e.to_string())
            })?;
        let Some(customer) = customers.into_iter().next() else {
            log::info!("detail: no customer for {}", email);
            return Ok(None);
        };
        let orders = self
            .store
            .orders_for_customer(&credentials, customer.id)
            .await
            .map_err(|e| {
                log::warn!("detail: order query for customer {} failed: {}", customer.id, e);
                ResolveError::SearchFailed(e.to_string())
            })?;
        Ok(Some(CustomerRecord { customer, orders }))
    }
}
