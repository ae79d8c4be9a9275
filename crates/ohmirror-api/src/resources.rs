// REST resource discovery.
//
// The server root (`/rest`) advertises the endpoint URLs for items,
// sitemaps and friends. Anything it does not advertise falls back to the
// conventional paths below the base URL.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::json::{as_array, str_field};

/// Endpoint URLs discovered from the server root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resources {
    pub items: Url,
    pub sitemaps: Url,
    pub images: Url,
    pub charts: Url,
    /// Every other advertised resource, keyed by its type name.
    pub other: BTreeMap<String, Url>,
}

impl Resources {
    /// Conventional endpoint locations below `base` (which must end in `/`).
    pub fn with_defaults(base: &Url) -> Result<Self, Error> {
        Ok(Self {
            items: base.join("rest/items")?,
            sitemaps: base.join("rest/sitemaps")?,
            images: base.join("images")?,
            charts: base.join("chart")?,
            other: BTreeMap::new(),
        })
    }

    /// Merge the links advertised by a `/rest` root document.
    ///
    /// Accepts both the openHAB 2 shape (`links: [{type, url}]`) and the
    /// older one (`link: [{"@type", "$"}]`). Returns the number of links
    /// that were applied.
    pub fn merge_root(&mut self, root: &Value) -> Result<usize, Error> {
        let mut applied = 0;

        let modern = root.get("links").map(as_array).unwrap_or_default();
        let legacy = root.get("link").map(as_array).unwrap_or_default();

        let pairs = modern
            .into_iter()
            .filter_map(|l| Some((str_field(l, "type")?, str_field(l, "url")?)))
            .chain(
                legacy
                    .into_iter()
                    .filter_map(|l| Some((str_field(l, "@type")?, str_field(l, "$")?))),
            );

        for (kind, raw) in pairs {
            let url = Url::parse(raw)?;
            debug!(resource = kind, %url, "discovered resource");
            match kind {
                "items" => self.items = url,
                "sitemaps" => self.sitemaps = url,
                "images" => self.images = url,
                "charts" | "chart" => self.charts = url,
                other => {
                    self.other.insert(other.to_owned(), url);
                }
            }
            applied += 1;
        }

        Ok(applied)
    }

    /// Look up any resource by its advertised type name.
    pub fn get(&self, kind: &str) -> Option<&Url> {
        match kind {
            "items" => Some(&self.items),
            "sitemaps" => Some(&self.sitemaps),
            "images" => Some(&self.images),
            "charts" | "chart" => Some(&self.charts),
            other => self.other.get(other),
        }
    }
}
