//! Commerce API: customer and order records and the client that fetches them.

mod client;

use crate::config::Credentials;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::StoreClient;

/// Fixed number of customers requested per search page.
pub const PAGE_SIZE: u32 = 20;

/// A customer as returned by `GET /customers`. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl Customer {
    /// "First Last", falling back to the username and then the email.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if !full.is_empty() {
            return full.to_string();
        }
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.email)
            .to_string()
    }
}

/// An order as returned by `GET /orders`. `total` is kept as the API's decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub number: String,
    pub status: String,
    pub total: String,
    pub date_created: String,
}

impl Order {
    /// Calendar date of `date_created` (YYYY-MM-DD); the raw string when it does not parse.
    pub fn created_on(&self) -> String {
        let raw = self.date_created.trim();
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
            return dt.format("%Y-%m-%d").to_string();
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            return dt.format("%Y-%m-%d").to_string();
        }
        raw.to_string()
    }
}

/// One page of a paginated customer query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32) -> Self {
        Self {
            page,
            per_page: PAGE_SIZE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store api error: {status} {body}")]
    Status { status: u16, body: String },
    #[error("store response could not be read: {0}")]
    Decode(String),
}

impl StoreError {
    /// HTTP status carried by the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Status { status, .. } => Some(*status),
            StoreError::Request(e) => e.status().map(|s| s.as_u16()),
            StoreError::Decode(_) => None,
        }
    }
}

/// The commerce API as the resolution pipeline sees it. Credentials are passed per call
/// because they are read fresh for every resolution attempt.
#[async_trait]
pub trait StoreApi: Send + Sync {
    /// `GET /customers?email=<e>` (plus `per_page`/`page` when `page` is given).
    async fn customers_by_email(
        &self,
        credentials: &Credentials,
        email: &str,
        page: Option<PageRequest>,
    ) -> Result<Vec<Customer>, StoreError>;

    /// `GET /orders?customer=<id>`.
    async fn orders_for_customer(
        &self,
        credentials: &Credentials,
        customer_id: u64,
    ) -> Result<Vec<Order>, StoreError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory store for pipeline tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Customers { email: String, page: Option<PageRequest> },
        Orders { customer_id: u64 },
    }

    pub type Reply<T> = Result<T, StoreError>;

    #[derive(Default)]
    pub struct FakeStore {
        pub calls: Mutex<Vec<Call>>,
        customers: Mutex<VecDeque<Reply<Vec<Customer>>>>,
        orders: Mutex<VecDeque<Reply<Vec<Order>>>>,
    }

    impl FakeStore {
        pub fn push_customers(&self, reply: Reply<Vec<Customer>>) {
            self.customers.lock().unwrap().push_back(reply);
        }

        pub fn push_orders(&self, reply: Reply<Vec<Order>>) {
            self.orders.lock().unwrap().push_back(reply);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StoreApi for FakeStore {
        async fn customers_by_email(
            &self,
            _credentials: &Credentials,
            email: &str,
            page: Option<PageRequest>,
        ) -> Result<Vec<Customer>, StoreError> {
            self.calls.lock().unwrap().push(Call::Customers {
                email: email.to_string(),
                page,
            });
            let reply = self.customers.lock().unwrap().pop_front();
            reply.unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn orders_for_customer(
            &self,
            _credentials: &Credentials,
            customer_id: u64,
        ) -> Result<Vec<Order>, StoreError> {
            self.calls.lock().unwrap().push(Call::Orders { customer_id });
            let reply = self.orders.lock().unwrap().pop_front();
            reply.unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Holds customer queries for emails starting with "slow" until `gate` is notified.
    #[derive(Default)]
    pub struct GatedStore {
        pub gate: Notify,
        pub inner: FakeStore,
    }

    #[async_trait]
    impl StoreApi for GatedStore {
        async fn customers_by_email(
            &self,
            credentials: &Credentials,
            email: &str,
            page: Option<PageRequest>,
        ) -> Result<Vec<Customer>, StoreError> {
            if email.starts_with("slow") {
                self.gate.notified().await;
            }
            self.inner.customers_by_email(credentials, email, page).await
        }

        async fn orders_for_customer(
            &self,
            credentials: &Credentials,
            customer_id: u64,
        ) -> Result<Vec<Order>, StoreError> {
            self.inner.orders_for_customer(credentials, customer_id).await
        }
    }

    pub fn customer(id: u64) -> Customer {
        Customer {
            id,
            email: format!("c{}@shop.example", id),
            first_name: format!("First{}", id),
            last_name: "Last".to_string(),
            username: None,
        }
    }

    pub fn order(id: u64) -> Order {
        Order {
            id,
            number: id.to_string(),
            status: "processing".to_string(),
            total: "10.00".to_string(),
            date_created: "2024-03-01T10:00:00".to_string(),
        }
    }

    pub fn credentials() -> Credentials {
        Credentials {
            base_url: "https://shop.example/wp-json/wc/v3".to_string(),
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
        }
    }

    pub fn http_error(status: u16) -> StoreError {
        StoreError::Status {
            status,
            body: String::new(),
        }
    }
}
