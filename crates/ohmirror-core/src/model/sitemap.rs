use std::sync::{Arc, Mutex};

use serde_json::Value as Json;
use url::Url;

use super::page::Page;
use crate::convert::{opt_str, required_str};
use crate::error::CoreError;
use crate::server::Server;
use crate::store::lock;

/// A sitemap as listed by the server. The homepage is loaded on demand.
#[derive(Debug)]
pub struct Sitemap {
    name: String,
    label: String,
    link: Url,
    homepage: Mutex<Option<Arc<Page>>>,
}

impl Sitemap {
    pub fn from_json(json: &Json) -> Result<Self, CoreError> {
        let name = required_str(json, "sitemap", "name")?;
        let link = Url::parse(required_str(json, "sitemap", "link")?)?;
        Ok(Self {
            name: name.to_owned(),
            label: opt_str(json, "label").unwrap_or(name).to_owned(),
            link,
            homepage: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn link(&self) -> &Url {
        &self.link
    }

    /// The homepage, if `load_page` has run.
    pub fn homepage(&self) -> Option<Arc<Page>> {
        lock(&self.homepage).clone()
    }

    /// Fetch the sitemap and build (or refresh) its homepage.
    pub async fn load_page(&self, server: &Server) -> Result<Arc<Page>, CoreError> {
        server.ensure_alive()?;
        let resp = server.client().fetch_json(&self.link, None).await?;
        let data = resp
            .body
            .get("homepage")
            .ok_or_else(|| CoreError::missing("sitemap", "homepage"))?;
        let page = server.create_or_update_page(&self.name, data, None)?;
        *lock(&self.homepage) = Some(Arc::clone(&page));
        Ok(page)
    }
}
