//! REST-backed section store.
//!
//! ```text
//! GET    {base}/templates/{template}/sections   → 200 [Section] | 404
//! POST   {base}/templates/{template}/sections   → 200/201 Section
//! PUT    {base}/sections/{id}                   → 2xx
//! DELETE {base}/sections/{id}                   → 2xx
//! ```

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};

use super::SectionStore;
use crate::StoreError;
use storefront_common::{NewSection, Section, SectionPatch};

#[derive(Debug, Clone)]
pub struct HttpSectionStore {
    client: Client,
    base_url: String,
}

impl HttpSectionStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn template_url(&self, template: &str) -> String {
        format!("{}/templates/{}/sections", self.base_url, template)
    }

    fn section_url(&self, section_id: &str) -> String {
        format!("{}/sections/{}", self.base_url, section_id)
    }
}

/// Turn a non-success response into [`StoreError::Status`]
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl SectionStore for HttpSectionStore {
    async fn load(&self, template: &str) -> Result<Option<Vec<Section>>, StoreError> {
        let response = self.client.get(self.template_url(template)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("[HttpSectionStore] template {} not materialized", template);
            return Ok(None);
        }
        let sections = check(response).await?.json::<Vec<Section>>().await?;
        Ok(Some(sections))
    }

    async fn create(&self, template: &str, section: &NewSection) -> Result<Section, StoreError> {
        let response = self
            .client
            .post(self.template_url(template))
            .json(section)
            .send()
            .await?;
        Ok(check(response).await?.json::<Section>().await?)
    }

    async fn update(&self, section_id: &str, patch: &SectionPatch) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.section_url(section_id))
            .json(patch)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete(&self, section_id: &str) -> Result<(), StoreError> {
        let response = self.client.delete(self.section_url(section_id)).send().await?;
        check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_strip_trailing_slash() {
        let store = HttpSectionStore::new("http://localhost:8080/api/");
        assert_eq!(store.base_url(), "http://localhost:8080/api");
        assert_eq!(
            store.template_url("product"),
            "http://localhost:8080/api/templates/product/sections"
        );
        assert_eq!(store.section_url("sec-4"), "http://localhost:8080/api/sections/sec-4");
    }
}
