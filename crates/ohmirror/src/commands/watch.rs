//! Live sitemap mirror.
//!
//! Opens a sitemap with page polling enabled, subscribes a printing
//! observer to every reachable page and widget, and streams attribute
//! changes to stdout until Ctrl-C, until stdout is closed or until the
//! server goes away. Pages and widgets that appear later (a new widget
//! on a page, a newly linked page) are picked up as they arrive.

use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use indexmap::IndexMap;
use owo_colors::OwoColorize;
use tokio::sync::Notify;

use ohmirror_core::{Observer, Page, Server, Value};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

/// Attribute keys whose change can bring new entities into view.
const STRUCTURAL_KEYS: &[&str] = &[
    "page_widgets",
    "widget_widgets",
    "widget_linked_page",
    "widget_item",
];

// ── Output sink ─────────────────────────────────────────────────────

/// Shared destination of every printer. The first failed write closes
/// it for all of them and wakes the command up.
struct Sink {
    out: Mutex<Box<dyn Write + Send>>,
    closed: AtomicBool,
    gone: Notify,
}

impl Sink {
    fn new(out: Box<dyn Write + Send>) -> Arc<Self> {
        Arc::new(Self {
            out: Mutex::new(out),
            closed: AtomicBool::new(false),
            gone: Notify::new(),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn write_line(&self, text: &str) {
        if self.is_closed() {
            return;
        }
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if writeln!(out, "{text}").and_then(|()| out.flush()).is_err()
            && !self.closed.swap(true, Ordering::SeqCst)
        {
            tracing::debug!("stdout closed, no longer printing");
            self.gone.notify_one();
        }
    }
}

// ── Printing observer ───────────────────────────────────────────────

/// Prints every diff of one entity as `<entity> <key> = <value>` lines.
struct PrintObserver {
    entity: String,
    color: bool,
    sink: Arc<Sink>,
}

impl PrintObserver {
    fn new(entity: impl Into<String>, color: bool, sink: &Arc<Sink>) -> Arc<Self> {
        Arc::new(Self {
            entity: entity.into(),
            color,
            sink: Arc::clone(sink),
        })
    }

    fn format(&self, changed: &IndexMap<String, Value>, deleted: &BTreeSet<String>) -> String {
        let mut lines = Vec::with_capacity(changed.len() + deleted.len());
        for (key, value) in changed {
            if self.color {
                lines.push(format!("{} {} = {}", self.entity.cyan(), key.bold(), value));
            } else {
                lines.push(format!("{} {key} = {value}", self.entity));
            }
        }
        for key in deleted {
            if self.color {
                lines.push(format!("{} {}", self.entity.cyan(), format!("-{key}").red()));
            } else {
                lines.push(format!("{} -{key}", self.entity));
            }
        }
        lines.join("\n")
    }
}

impl Observer for PrintObserver {
    fn update(&self, changed: &IndexMap<String, Value>, deleted: &BTreeSet<String>) {
        if self.sink.is_closed() {
            return;
        }
        let text = self.format(changed, deleted);
        if !text.is_empty() {
            self.sink.write_line(&text);
        }
    }
}

// ── Subscription tree ───────────────────────────────────────────────

#[derive(Default)]
struct Seen {
    pages: HashSet<String>,
    widgets: HashSet<String>,
    items: HashSet<String>,
    printers: Vec<Arc<PrintObserver>>,
}

/// Every page and widget reachable from `home`, each with a printer.
///
/// A [`Restructure`] observer rides along on every page and widget and
/// walks the tree again when the set of reachable entities may have
/// grown. Walks never hold the `seen` lock while subscribing.
struct Tree {
    server: Server,
    home: Arc<Page>,
    color: bool,
    items: bool,
    sink: Arc<Sink>,
    seen: Mutex<Seen>,
    restructure: Arc<Restructure>,
    walking: AtomicBool,
    dirty: AtomicBool,
}

impl Tree {
    fn new(server: &Server, home: &Arc<Page>, color: bool, items: bool, sink: &Arc<Sink>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            server: server.clone(),
            home: Arc::clone(home),
            color,
            items,
            sink: Arc::clone(sink),
            seen: Mutex::new(Seen::default()),
            restructure: Arc::new(Restructure { tree: this.clone() }),
            walking: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        })
    }

    /// Walk the tree now, or make the walk in progress go round once
    /// more. Subscribing during a walk delivers snapshots that land
    /// here again; those only mark the tree dirty.
    fn refresh(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        loop {
            if self
                .walking
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }
            while self.dirty.swap(false, Ordering::SeqCst) {
                self.walk();
            }
            self.walking.store(false, Ordering::SeqCst);
            if !self.dirty.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    fn walk(&self) {
        let mut visited = HashSet::new();
        let mut pending = vec![Arc::clone(&self.home)];

        while let Some(page) = pending.pop() {
            if !visited.insert(page.id().to_owned()) {
                continue;
            }
            if self.claim(|s| &mut s.pages, page.id()) {
                let printer = PrintObserver::new(format!("page:{}", page.id()), self.color, &self.sink);
                self.keep(&printer);
                page.subscribe(&printer);
                page.subscribe(&self.restructure);
            }

            for widget in page.all_widgets() {
                if self.claim(|s| &mut s.widgets, widget.id()) {
                    let printer =
                        PrintObserver::new(format!("widget:{}", widget.id()), self.color, &self.sink);
                    self.keep(&printer);
                    widget.subscribe(&printer);
                    widget.subscribe(&self.restructure);
                }
                if let Some(linked) = widget.linked_page() {
                    pending.push(linked);
                }
                if let Some(item) = widget.item() {
                    if self.items && self.claim(|s| &mut s.items, item.name()) {
                        self.server.watch_item(&item);
                    }
                }
            }
        }
    }

    /// Record `key` as seen. Returns `true` the first time.
    fn claim(&self, set: impl FnOnce(&mut Seen) -> &mut HashSet<String>, key: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        set(&mut seen).insert(key.to_owned())
    }

    fn keep(&self, printer: &Arc<PrintObserver>) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .printers
            .push(Arc::clone(printer));
    }

    fn counts(&self) -> (usize, usize) {
        let seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        (seen.pages.len(), seen.widgets.len())
    }
}

/// Re-walks its tree when a page or widget changes shape.
struct Restructure {
    tree: Weak<Tree>,
}

impl Observer for Restructure {
    fn update(&self, changed: &IndexMap<String, Value>, _deleted: &BTreeSet<String>) {
        if !STRUCTURAL_KEYS.iter().any(|key| changed.contains_key(*key)) {
            return;
        }
        if let Some(tree) = self.tree.upgrade() {
            tree.refresh();
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    resolved: Resolved,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let sitemap = args
        .sitemap
        .or(resolved.sitemap)
        .ok_or_else(|| CliError::Validation {
            field: "sitemap".into(),
            reason: "name a sitemap or set `sitemap` in the profile".into(),
        })?;

    let mut config = resolved.server;
    config.poll_pages = true;
    let server = Server::connect(config).await?;

    let lost = Arc::new(Notify::new());
    {
        let lost = Arc::clone(&lost);
        server.on_terminate(move |_| lost.notify_one());
    }

    let home = server.open_sitemap(&sitemap).await?;
    let color = output::should_color(&global.color) && !global.quiet;
    let sink = Sink::new(Box::new(std::io::stdout()));
    let tree = Tree::new(&server, &home, color, args.items, &sink);
    tree.refresh();

    let (pages, widgets) = tree.counts();
    tracing::info!(
        %sitemap,
        pages,
        widgets,
        workers = server.worker_count(),
        "watching"
    );

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => Ok(()),
        () = sink.gone.notified() => Ok(()),
        () = lost.notified() => Err(CliError::Disconnected),
    };

    server.close().await;
    drop(tree);
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;

    use ohmirror_core::{ProxySetting, ServerConfig};
    use serde_json::json;

    use super::*;

    /// In-memory stdout that can be read back or made to fail.
    #[derive(Clone, Default)]
    struct Capture {
        buf: Arc<Mutex<Vec<u8>>>,
        broken: Arc<AtomicBool>,
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.buf.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Capture {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.buf.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn offline_server() -> Server {
        let mut config = ServerConfig::for_host("127.0.0.1", 1).unwrap();
        config.proxy = ProxySetting::NoProxy;
        Server::new(config).unwrap()
    }

    fn page_json(id: &str, widgets: &serde_json::Value) -> serde_json::Value {
        json!({
            "id": id,
            "title": id,
            "link": format!("http://127.0.0.1:1/rest/sitemaps/demo/{id}"),
            "leaf": false,
            "widgets": widgets
        })
    }

    #[test]
    fn formats_changes_then_deletions() {
        let sink = Sink::new(Box::new(io::sink()));
        let printer = PrintObserver::new("widget:0000", false, &sink);
        let mut changed = IndexMap::new();
        changed.insert("label".to_owned(), Value::from("Kitchen"));
        changed.insert("value".to_owned(), Value::from("ON"));
        let deleted = BTreeSet::from(["icon".to_owned()]);

        assert_eq!(
            printer.format(&changed, &deleted),
            "widget:0000 label = Kitchen\nwidget:0000 value = ON\nwidget:0000 -icon"
        );
    }

    #[test]
    fn empty_diff_prints_nothing() {
        let capture = Capture::default();
        let sink = Sink::new(Box::new(capture.clone()));
        let printer = PrintObserver::new("page:demo", false, &sink);
        assert!(printer.format(&IndexMap::new(), &BTreeSet::new()).is_empty());

        printer.update(&IndexMap::new(), &BTreeSet::new());
        assert!(capture.text().is_empty());
    }

    #[test]
    fn closed_stdout_stops_every_printer() {
        let capture = Capture::default();
        let sink = Sink::new(Box::new(capture.clone()));
        let first = PrintObserver::new("page:demo", false, &sink);
        let second = PrintObserver::new("widget:demo_0", false, &sink);
        let mut changed = IndexMap::new();
        changed.insert("page_title".to_owned(), Value::from("Demo"));

        first.update(&changed, &BTreeSet::new());
        assert_eq!(capture.text(), "page:demo page_title = Demo\n");

        capture.broken.store(true, Ordering::SeqCst);
        first.update(&changed, &BTreeSet::new());
        assert!(sink.is_closed());

        capture.broken.store(false, Ordering::SeqCst);
        second.update(&changed, &BTreeSet::new());
        assert_eq!(capture.text(), "page:demo page_title = Demo\n");
    }

    #[test]
    fn tree_follows_new_widgets_and_linked_pages() {
        let server = offline_server();
        let home = server
            .create_or_update_page(
                "demo",
                &page_json("demo", &json!([{ "widgetId": "demo_0", "type": "Text", "label": "Hall" }])),
                None,
            )
            .unwrap();

        let capture = Capture::default();
        let sink = Sink::new(Box::new(capture.clone()));
        let tree = Tree::new(&server, &home, false, false, &sink);
        tree.refresh();
        assert_eq!(tree.counts(), (1, 1));

        // A new group widget shows up, linking to a page nobody saw yet.
        server
            .create_or_update_page(
                "demo",
                &page_json(
                    "demo",
                    &json!([
                        { "widgetId": "demo_0", "type": "Text", "label": "Hall" },
                        {
                            "widgetId": "demo_1",
                            "type": "Group",
                            "label": "Cellar",
                            "linkedPage": page_json(
                                "demo_1",
                                &json!([{ "widgetId": "demo_1_0", "type": "Text", "label": "Freezer" }])
                            )
                        }
                    ]),
                ),
                None,
            )
            .unwrap();

        assert_eq!(tree.counts(), (2, 3));
        let text = capture.text();
        assert!(text.contains("page:demo_1 page_title = demo_1"), "{text}");
        assert!(text.contains("widget:demo_1_0 widget_label = Freezer"), "{text}");

        // Changes on the late arrivals are printed like any other.
        server
            .create_or_update_page(
                "demo",
                &page_json(
                    "demo_1",
                    &json!([{ "widgetId": "demo_1_0", "type": "Text", "label": "Chest freezer" }]),
                ),
                None,
            )
            .unwrap();
        assert!(capture.text().contains("widget:demo_1_0 widget_label = Chest freezer"));
    }
}
