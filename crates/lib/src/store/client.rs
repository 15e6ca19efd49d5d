//! HTTP client for the commerce REST API (basic auth with consumer key and secret).

use super::{Customer, Order, PageRequest, StoreApi, StoreError};
use crate::config::Credentials;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Client for the store's REST API. Holds no credentials; each call is given them.
#[derive(Clone, Default)]
pub struct StoreClient {
    client: reqwest::Client,
}

impl StoreClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        credentials: &Credentials,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, StoreError> {
        let url = format!("{}/{}", credentials.base_url.trim_end_matches('/'), path);
        log::debug!("store: GET {} {:?}", url, query);
        let res = self
            .client
            .get(&url)
            .query(query)
            .basic_auth(&credentials.consumer_key, Some(&credentials.consumer_secret))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }
        let text = res.text().await?;
        serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StoreApi for StoreClient {
    async fn customers_by_email(
        &self,
        credentials: &Credentials,
        email: &str,
        page: Option<PageRequest>,
    ) -> Result<Vec<Customer>, StoreError> {
        let mut query = vec![("email", email.to_string())];
        if let Some(p) = page {
            query.push(("per_page", p.per_page.to_string()));
            query.push(("page", p.page.to_string()));
        }
        self.get_json(credentials, "customers", &query).await
    }

    async fn orders_for_customer(
        &self,
        credentials: &Credentials,
        customer_id: u64,
    ) -> Result<Vec<Order>, StoreError> {
        self.get_json(credentials, "orders", &[("customer", customer_id.to_string())])
            .await
    }
}
