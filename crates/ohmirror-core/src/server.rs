// ── Server session ──
//
// Root of the mirror: owns the REST client, the discovered resource
// URLs and the id-keyed registries of pages, items and widgets. Every
// entity is created through `create_or_update_*`, which guarantees one
// instance per id for the lifetime of the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value as Json;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use ohmirror_api::json::as_array;
use ohmirror_api::{BasicAuth, ProxyMode, Resources, RestClient, TransportConfig};

use crate::config::{ProxySetting, ServerConfig};
use crate::convert::required_str;
use crate::error::CoreError;
use crate::model::{Item, ItemKind, Page, Sitemap, Widget, WidgetKind};
use crate::store::lock;
use crate::sync::{PollTarget, poll_loop};

type TerminateCallback = Box<dyn Fn(&Server) + Send + Sync>;

// ── Server ───────────────────────────────────────────────────────

/// One session against an openHAB server.
///
/// Cheaply cloneable via `Arc<ServerInner>`. Once terminated (either
/// explicitly or because a poll worker lost the connection) the session
/// stays dead; reconnecting means building a new `Server`.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

/// Non-owning handle used by background workers, so a session whose
/// last `Server` was dropped shuts its workers down.
#[derive(Clone)]
pub(crate) struct WeakServer(Weak<ServerInner>);

impl WeakServer {
    pub(crate) fn upgrade(&self) -> Option<Server> {
        self.0.upgrade().map(|inner| Server { inner })
    }
}

struct ServerInner {
    config: ServerConfig,
    client: RestClient,
    resources: RwLock<Resources>,
    sitemaps: DashMap<String, Arc<Sitemap>>,
    pages: DashMap<String, Arc<Page>>,
    items: DashMap<String, Arc<Item>>,
    widgets: DashMap<String, Arc<Widget>>,
    alive: AtomicBool,
    cancel: CancellationToken,
    terminate_callbacks: Mutex<Vec<TerminateCallback>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Server {
    /// Build a session without touching the network. Resource URLs
    /// start out as the conventional defaults under the base URL.
    pub fn new(config: ServerConfig) -> Result<Self, CoreError> {
        let transport = build_transport(&config);
        let client = RestClient::new(config.url.clone(), &transport)?;
        let resources = Resources::with_defaults(client.base_url())?;

        Ok(Self {
            inner: Arc::new(ServerInner {
                config,
                client,
                resources: RwLock::new(resources),
                sitemaps: DashMap::new(),
                pages: DashMap::new(),
                items: DashMap::new(),
                widgets: DashMap::new(),
                alive: AtomicBool::new(true),
                cancel: CancellationToken::new(),
                terminate_callbacks: Mutex::new(Vec::new()),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Build a session and discover its REST resources.
    pub async fn connect(config: ServerConfig) -> Result<Self, CoreError> {
        let server = Self::new(config)?;
        server.load_resources().await?;
        info!(url = %server.inner.config.url, "connected to openHAB");
        Ok(server)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &RestClient {
        &self.inner.client
    }

    pub fn resources(&self) -> Resources {
        self.inner
            .resources
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn downgrade(&self) -> WeakServer {
        WeakServer(Arc::downgrade(&self.inner))
    }

    // ── Loading ──────────────────────────────────────────────────

    /// Fetch `/rest` and merge the advertised resource links.
    pub async fn load_resources(&self) -> Result<Resources, CoreError> {
        self.ensure_alive()?;
        let resources = self.inner.client.load_resources().await?;
        *self
            .inner
            .resources
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = resources.clone();
        Ok(resources)
    }

    /// Fetch the sitemap list. Sitemaps start without content; call
    /// [`Sitemap::load_page`] or [`Server::open_sitemap`] to load one.
    pub async fn load_sitemaps(&self) -> Result<Vec<Arc<Sitemap>>, CoreError> {
        self.ensure_alive()?;
        let url = self.resources().sitemaps;
        let resp = self.inner.client.fetch_json(&url, None).await?;
        let list = resp.body.get("sitemap").unwrap_or(&resp.body);

        let mut sitemaps = Vec::new();
        for data in as_array(list) {
            let sitemap = Arc::new(Sitemap::from_json(data)?);
            sitemaps.push(Arc::clone(&sitemap));
        }

        self.inner.sitemaps.clear();
        for sitemap in &sitemaps {
            self.inner
                .sitemaps
                .insert(sitemap.name().to_owned(), Arc::clone(sitemap));
        }
        info!(count = sitemaps.len(), "loaded sitemaps");
        Ok(sitemaps)
    }

    pub fn sitemap(&self, name: &str) -> Option<Arc<Sitemap>> {
        self.inner.sitemaps.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn sitemaps(&self) -> Vec<Arc<Sitemap>> {
        let mut list: Vec<_> = self.inner.sitemaps.iter().map(|e| Arc::clone(e.value())).collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    /// Load the homepage of sitemap `name`, fetching the sitemap list
    /// first if it has not been loaded yet.
    pub async fn open_sitemap(&self, name: &str) -> Result<Arc<Page>, CoreError> {
        self.ensure_alive()?;
        if self.inner.sitemaps.is_empty() {
            self.load_sitemaps().await?;
        }
        let sitemap = self
            .sitemap(name)
            .ok_or_else(|| CoreError::SitemapNotFound {
                name: name.to_owned(),
            })?;
        sitemap.load_page(self).await
    }

    /// Fetch every item. Existing item instances are updated in place,
    /// so widgets keep pointing at the same objects.
    pub async fn load_items(&self) -> Result<Vec<Arc<Item>>, CoreError> {
        self.ensure_alive()?;
        let url = self.resources().items;
        let resp = self.inner.client.fetch_json(&url, None).await?;
        let list = resp.body.get("item").unwrap_or(&resp.body);

        let mut items = Vec::new();
        for data in as_array(list) {
            if let Some(item) = self.create_or_update_item(data)? {
                items.push(item);
            }
        }
        info!(count = items.len(), "loaded items");
        Ok(items)
    }

    /// Fetch a single item by name.
    pub async fn fetch_item(&self, name: &str) -> Result<Arc<Item>, CoreError> {
        self.ensure_alive()?;
        let base = self.resources().items;
        let url = Url::parse(&format!("{}/{name}", base.as_str().trim_end_matches('/')))?;
        let resp = match self.inner.client.fetch_json(&url, None).await {
            Err(ohmirror_api::Error::Http { status: 404, .. }) => {
                return Err(CoreError::ItemNotFound {
                    name: name.to_owned(),
                });
            }
            other => other?,
        };
        let kind = required_str(&resp.body, "item", "type")?;
        self.create_or_update_item(&resp.body)?
            .ok_or_else(|| CoreError::UnknownKind {
                entity: "item",
                kind: kind.to_owned(),
            })
    }

    // ── Registries ───────────────────────────────────────────────

    pub fn page(&self, id: &str) -> Option<Arc<Page>> {
        self.inner.pages.get(id).map(|e| Arc::clone(e.value()))
    }

    pub fn item(&self, name: &str) -> Option<Arc<Item>> {
        self.inner.items.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn widget(&self, id: &str) -> Option<Arc<Widget>> {
        self.inner.widgets.get(id).map(|e| Arc::clone(e.value()))
    }

    /// All known items, sorted by name.
    pub fn items(&self) -> Vec<Arc<Item>> {
        let mut list: Vec<_> = self.inner.items.iter().map(|e| Arc::clone(e.value())).collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    pub fn page_count(&self) -> usize {
        self.inner.pages.len()
    }

    /// Return the page registered under the payload's id, updated from
    /// `data`, or create and register a new one. New pages get a poll
    /// worker when `poll_pages` is set.
    pub fn create_or_update_page(
        &self,
        sitemap: &str,
        data: &Json,
        prev_page: Option<&Arc<Page>>,
    ) -> Result<Arc<Page>, CoreError> {
        let id = required_str(data, "page", "id")?;
        if let Some(existing) = self.page(id) {
            existing.init(self, data)?;
            return Ok(existing);
        }

        let (page, created) = register(&self.inner.pages, id, || {
            Arc::new(Page::new(id, sitemap, prev_page))
        });
        if let Err(e) = page.init(self, data) {
            if created {
                self.inner.pages.remove(id);
            }
            return Err(e);
        }

        if created {
            debug!(page = %id, sitemap, "page created");
            if self.inner.config.poll_pages {
                self.watch_page(&page);
            }
        }
        Ok(page)
    }

    /// Item counterpart of [`Server::create_or_update_page`], keyed by
    /// item name. Unknown item types are logged and yield `None`.
    pub fn create_or_update_item(&self, data: &Json) -> Result<Option<Arc<Item>>, CoreError> {
        let name = required_str(data, "item", "name")?;
        if let Some(existing) = self.item(name) {
            existing.init(data)?;
            return Ok(Some(existing));
        }

        let type_name = required_str(data, "item", "type")?;
        let Some(kind) = ItemKind::from_type(type_name) else {
            warn!(item = %name, kind = %type_name, "unknown item type, skipping");
            return Ok(None);
        };
        let link = Url::parse(required_str(data, "item", "link")?)?;

        let (item, created) = register(&self.inner.items, name, || {
            Arc::new(Item::new(name, kind, type_name, link, self.inner.client.clone()))
        });
        if let Err(e) = item.init(data) {
            if created {
                self.inner.items.remove(name);
            }
            return Err(e);
        }
        Ok(Some(item))
    }

    /// Widget counterpart of [`Server::create_or_update_page`], keyed by
    /// `widgetId`. Unknown widget types are logged and yield `None`.
    pub fn create_or_update_widget(
        &self,
        page: &Arc<Page>,
        data: &Json,
    ) -> Result<Option<Arc<Widget>>, CoreError> {
        let id = required_str(data, "widget", "widgetId")?;
        if let Some(existing) = self.widget(id) {
            existing.init(self, page, data)?;
            return Ok(Some(existing));
        }

        let type_name = required_str(data, "widget", "type")?;
        let Ok(kind) = type_name.parse::<WidgetKind>() else {
            warn!(widget = %id, kind = %type_name, "unknown widget type, skipping");
            return Ok(None);
        };

        let (widget, created) = register(&self.inner.widgets, id, || {
            Arc::new(Widget::new(id, kind, page))
        });
        if let Err(e) = widget.init(self, page, data) {
            if created {
                self.inner.widgets.remove(id);
            }
            return Err(e);
        }
        Ok(Some(widget))
    }

    // ── Background polling ───────────────────────────────────────

    /// Start a long-poll worker for `page`.
    pub fn watch_page(&self, page: &Arc<Page>) {
        self.spawn_worker(PollTarget::Page(Arc::clone(page)));
    }

    /// Start a long-poll worker for a single item.
    pub fn watch_item(&self, item: &Arc<Item>) {
        self.spawn_worker(PollTarget::Item(Arc::clone(item)));
    }

    fn spawn_worker(&self, target: PollTarget) {
        if !self.is_alive() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!(%target, "no async runtime, not polling");
            return;
        };
        debug!(%target, "spawning poll worker");
        let cancel = self.inner.cancel.child_token();
        let handle = runtime.spawn(poll_loop(self.downgrade(), target, cancel));
        lock(&self.inner.task_handles).push(handle);
    }

    /// Number of poll workers spawned so far.
    pub fn worker_count(&self) -> usize {
        lock(&self.inner.task_handles).len()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Refuse new requests once the session has ended.
    pub(crate) fn ensure_alive(&self) -> Result<(), CoreError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(CoreError::Terminated)
        }
    }

    /// Register a callback for when the session terminates because the
    /// connection was lost (or [`Server::terminate`] was called).
    pub fn on_terminate(&self, callback: impl Fn(&Server) + Send + Sync + 'static) {
        lock(&self.inner.terminate_callbacks).push(Box::new(callback));
    }

    /// End the session: flip liveness, stop every worker and run the
    /// termination callbacks. Only the first call has any effect.
    pub fn terminate(&self) {
        if !self.inner.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("server session terminated");
        self.inner.cancel.cancel();

        let callbacks = std::mem::take(&mut *lock(&self.inner.terminate_callbacks));
        for callback in &callbacks {
            callback(self);
        }
    }

    /// Shut down without running termination callbacks and wait for the
    /// poll workers to exit.
    pub async fn close(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
        self.inner.cancel.cancel();

        let handles = std::mem::take(&mut *lock(&self.inner.task_handles));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "poll worker ended abnormally");
            }
        }
        debug!("server closed");
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("url", &self.inner.config.url.as_str())
            .field("alive", &self.is_alive())
            .field("pages", &self.inner.pages.len())
            .field("items", &self.inner.items.len())
            .field("widgets", &self.inner.widgets.len())
            .finish_non_exhaustive()
    }
}

/// Insert-if-absent. The map's shard lock is released before the
/// caller initializes the entity, since init re-enters the registries.
fn register<T>(
    map: &DashMap<String, Arc<T>>,
    id: &str,
    make: impl FnOnce() -> Arc<T>,
) -> (Arc<T>, bool) {
    match map.entry(id.to_owned()) {
        Entry::Occupied(e) => (Arc::clone(e.get()), false),
        Entry::Vacant(v) => {
            let value = make();
            v.insert(Arc::clone(&value));
            (value, true)
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Build a [`TransportConfig`] from a [`ServerConfig`].
fn build_transport(config: &ServerConfig) -> TransportConfig {
    let proxy = match &config.proxy {
        ProxySetting::System => ProxyMode::System,
        ProxySetting::NoProxy => ProxyMode::Disabled,
        ProxySetting::Url(url) => ProxyMode::Explicit(url.clone()),
    };
    let basic_auth = config
        .credentials
        .as_ref()
        .map(|c| BasicAuth::new(c.username.clone(), c.password.clone()));

    TransportConfig {
        timeout: config.timeout,
        long_poll_timeout: config.long_poll_timeout,
        proxy,
        basic_auth,
    }
}
