// ── Pages ──
//
// A page is a sitemap homepage or the target of a group/text widget.
// Pages are unique per id across the server; refreshing a page mutates
// the existing instance so widgets linking to it stay valid.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use indexmap::IndexMap;
use serde_json::Value as Json;
use url::Url;

use ohmirror_api::json::as_array;
use ohmirror_api::{JsonResponse, RestClient};

use super::value::Value;
use super::widget::Widget;
use crate::convert::{json_bool, opt_str, required_str, split_label};
use crate::error::CoreError;
use crate::observer::Observer;
use crate::server::Server;
use crate::store::{ChangeSet, Observed, Tracked, lock};

#[derive(Debug)]
pub(crate) struct PageState {
    attrs: ChangeSet,
    widgets: Vec<Arc<Widget>>,
}

impl Tracked for PageState {
    fn attrs(&self) -> &ChangeSet {
        &self.attrs
    }
    fn attrs_mut(&mut self) -> &mut ChangeSet {
        &mut self.attrs
    }
}

#[derive(Debug)]
pub struct Page {
    id: String,
    sitemap: String,
    prev_page: Option<Weak<Page>>,
    tracked: Observed<PageState>,
    tracking_id: Mutex<Option<String>>,
}

impl Page {
    pub(crate) fn new(id: &str, sitemap: &str, prev_page: Option<&Arc<Page>>) -> Self {
        Self {
            id: id.to_owned(),
            sitemap: sitemap.to_owned(),
            prev_page: prev_page.map(Arc::downgrade),
            tracked: Observed::new(PageState {
                attrs: ChangeSet::new("page_"),
                widgets: Vec::new(),
            }),
            tracking_id: Mutex::new(None),
        }
    }

    /// Apply a page payload.
    ///
    /// Widgets already on the page keep their position; widgets seen
    /// for the first time are appended. A payload without `widgets`
    /// leaves the widget list alone.
    pub fn init(self: &Arc<Self>, server: &Server, json: &Json) -> Result<(), CoreError> {
        let link = required_str(json, "page", "link")?;
        let leaf = json_bool(json, "leaf");
        let (title, value) = split_label(opt_str(json, "title"));

        let widgets = match json.get("widgets") {
            Some(raw) => {
                let mut list = Vec::new();
                for data in as_array(raw) {
                    if let Some(widget) = server.create_or_update_widget(self, data)? {
                        list.push(widget);
                    }
                }
                Some(list)
            }
            None => None,
        };

        self.tracked.apply(|s| {
            s.attrs.set("link", link);
            s.attrs.set_opt("leaf", leaf);
            s.attrs.set_opt("title", title);
            s.attrs.set_opt("value", value);
            if let Some(widgets) = widgets {
                let known: HashSet<String> = s.widgets.iter().map(|w| w.id().to_owned()).collect();
                for widget in widgets {
                    if !known.contains(widget.id()) {
                        s.widgets.push(widget);
                    }
                }
                let ids: Vec<String> = s.widgets.iter().map(|w| w.id().to_owned()).collect();
                s.attrs.set("widgets", ids);
            }
        });
        Ok(())
    }

    pub(crate) async fn fetch(
        &self,
        client: &RestClient,
        long_poll: bool,
    ) -> Result<JsonResponse, CoreError> {
        let link = self
            .link()
            .ok_or_else(|| CoreError::missing("page", "link"))?;
        let url = Url::parse(&link)?;
        let resp = if long_poll {
            let tracking = lock(&self.tracking_id).clone();
            client.long_poll(&url, tracking.as_deref()).await?
        } else {
            client.fetch_json(&url, None).await?
        };
        Ok(resp)
    }

    pub(crate) fn apply_response(
        self: &Arc<Self>,
        server: &Server,
        resp: &JsonResponse,
    ) -> Result<(), CoreError> {
        self.init(server, &resp.body)?;
        *lock(&self.tracking_id) = resp.tracking_id().map(str::to_owned);
        Ok(())
    }

    /// Fetch the page again and apply it. With `long_poll` the request
    /// waits for the next change on the server.
    pub async fn refresh(self: &Arc<Self>, server: &Server, long_poll: bool) -> Result<(), CoreError> {
        let resp = self.fetch(server.client(), long_poll).await?;
        self.apply_response(server, &resp)
    }

    // ── Accessors ──

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sitemap(&self) -> &str {
        &self.sitemap
    }

    pub fn prev_page(&self) -> Option<Arc<Page>> {
        self.prev_page.as_ref().and_then(Weak::upgrade)
    }

    /// Pages leading to this one, root first. Stops at the first page
    /// that has been dropped.
    pub fn breadcrumb(&self) -> Vec<Arc<Page>> {
        let mut trail = Vec::new();
        let mut cursor = self.prev_page();
        while let Some(page) = cursor {
            cursor = page.prev_page();
            trail.push(page);
        }
        trail.reverse();
        trail
    }

    pub fn widgets(&self) -> Vec<Arc<Widget>> {
        self.tracked.read(|s| s.widgets.clone())
    }

    /// Every widget on the page, frames flattened depth-first.
    pub fn all_widgets(&self) -> Vec<Arc<Widget>> {
        fn walk(out: &mut Vec<Arc<Widget>>, widgets: Vec<Arc<Widget>>) {
            for w in widgets {
                let children = w.children();
                out.push(w);
                walk(out, children);
            }
        }
        let mut out = Vec::new();
        walk(&mut out, self.widgets());
        out
    }

    pub fn attr(&self, key: &str) -> Option<Value> {
        self.tracked.read(|s| s.attrs.get(key).cloned())
    }

    pub fn link(&self) -> Option<String> {
        self.attr("link").and_then(|v| v.as_str().map(str::to_owned))
    }

    pub fn title(&self) -> Option<String> {
        self.attr("title").and_then(|v| v.as_str().map(str::to_owned))
    }

    pub fn value(&self) -> Option<String> {
        self.attr("value").and_then(|v| v.as_str().map(str::to_owned))
    }

    pub fn is_leaf(&self) -> bool {
        self.attr("leaf").and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.tracked.read(|s| s.attrs.snapshot())
    }

    pub fn tracking_id(&self) -> Option<String> {
        lock(&self.tracking_id).clone()
    }

    // ── Observers ──

    pub fn subscribe<O: Observer + 'static>(&self, observer: &Arc<O>) {
        self.tracked.subscribe(observer);
    }

    pub fn unsubscribe<O: Observer + 'static>(&self, observer: &Arc<O>) -> bool {
        self.tracked.unsubscribe(observer)
    }
}
