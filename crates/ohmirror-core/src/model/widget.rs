// ── Widgets ──
//
// A widget is one row on a page. Every kind shares the label/value/icon
// attributes; the rest depends on the kind. Frames nest widgets, group
// and text widgets may link to a child page.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde_json::Value as Json;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use ohmirror_api::json::as_array;

use super::item::{Item, ItemKind};
use super::mapping::Mapping;
use super::page::Page;
use super::value::Value;
use crate::convert::{json_bool, json_decimal, json_int, opt_str, required_str, split_label};
use crate::error::CoreError;
use crate::observer::Observer;
use crate::server::Server;
use crate::store::{ChangeSet, Observed, Tracked};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter,
)]
pub enum WidgetKind {
    Colorpicker,
    Chart,
    Frame,
    Group,
    Image,
    Selection,
    Setpoint,
    Slider,
    Switch,
    Text,
    Video,
    Mapview,
    Webview,
}

impl WidgetKind {
    /// Kinds that can open a child page.
    pub fn links_page(self) -> bool {
        matches!(self, Self::Group | Self::Text)
    }

    /// Kinds whose value is derived from a mapping.
    pub fn has_mapping(self) -> bool {
        matches!(self, Self::Selection | Self::Switch)
    }
}

#[derive(Debug)]
pub(crate) struct WidgetState {
    attrs: ChangeSet,
    item: Option<Arc<Item>>,
    children: Vec<Arc<Widget>>,
    linked_page: Option<Weak<Page>>,
}

impl Tracked for WidgetState {
    fn attrs(&self) -> &ChangeSet {
        &self.attrs
    }
    fn attrs_mut(&mut self) -> &mut ChangeSet {
        &mut self.attrs
    }
}

#[derive(Debug)]
pub struct Widget {
    id: String,
    kind: WidgetKind,
    parent: Weak<Page>,
    tracked: Observed<WidgetState>,
}

/// Everything a payload resolves to, computed before any state is
/// touched.
struct Resolved {
    attrs: IndexMap<&'static str, Option<Value>>,
    item: Option<Arc<Item>>,
    children: Option<Vec<Arc<Widget>>>,
    linked_page: Option<Option<Weak<Page>>>,
}

impl Widget {
    pub(crate) fn new(id: &str, kind: WidgetKind, parent: &Arc<Page>) -> Self {
        Self {
            id: id.to_owned(),
            kind,
            parent: Arc::downgrade(parent),
            tracked: Observed::new(WidgetState {
                attrs: ChangeSet::new("widget_"),
                item: None,
                children: Vec::new(),
                linked_page: None,
            }),
        }
    }

    /// Apply a widget payload. Referenced items, nested widgets and
    /// linked pages are resolved through the server registry first; the
    /// widget's own state only changes once all of them succeeded.
    pub fn init(&self, server: &Server, page: &Arc<Page>, json: &Json) -> Result<(), CoreError> {
        let resolved = self.resolve(server, page, json)?;
        let current = resolved.item.clone();

        let previous = self.tracked.apply(|s| {
            for (key, value) in resolved.attrs {
                s.attrs.set_opt(key, value);
            }
            let previous = std::mem::replace(&mut s.item, resolved.item);
            if let Some(children) = resolved.children {
                let ids: Vec<String> = children.iter().map(|w| w.id.clone()).collect();
                s.attrs.set("widgets", ids);
                s.children = children;
            }
            if let Some(linked) = resolved.linked_page {
                s.linked_page = linked;
            }
            previous
        });

        let same = match (&previous, &current) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same {
            self.move_item_observers(previous.as_deref(), current.as_deref());
        }
        Ok(())
    }

    /// Widget observers also follow the widget's item. When the payload
    /// points the widget at another item, detach them from the old one,
    /// hand them the new item's snapshot and delete the item keys that
    /// only the old item had.
    fn move_item_observers(&self, previous: Option<&Item>, current: Option<&Item>) {
        let observers = self.tracked.observers().live();
        if observers.is_empty() {
            return;
        }
        let stale: BTreeSet<String> = match previous {
            Some(old) => {
                let keep = current.map(Item::snapshot).unwrap_or_default();
                old.snapshot()
                    .into_keys()
                    .filter(|k| !keep.contains_key(k))
                    .collect()
            }
            None => BTreeSet::new(),
        };

        for observer in &observers {
            if let Some(old) = previous {
                old.unsubscribe(observer);
            }
            if let Some(new) = current {
                new.subscribe_shared(observer);
            }
            if !stale.is_empty() {
                observer.update(&IndexMap::new(), &stale);
            }
        }
    }

    fn resolve(&self, server: &Server, page: &Arc<Page>, json: &Json) -> Result<Resolved, CoreError> {
        let mut attrs: IndexMap<&'static str, Option<Value>> = IndexMap::new();

        let (label, value) = split_label(opt_str(json, "label"));
        let icon = opt_str(json, "icon")
            .filter(|icon| *icon != "none")
            .map(|icon| {
                let images = server.resources().images;
                format!("{}/{icon}.png", images.as_str().trim_end_matches('/'))
            });

        let item = match json.get("item").filter(|v| !v.is_null()) {
            Some(data) => server.create_or_update_item(data)?,
            None => None,
        };

        attrs.insert("label", label.map(Value::from));
        attrs.insert("value", value.map(Value::from));
        attrs.insert("icon", icon.map(Value::from));
        attrs.insert("label_color", opt_str(json, "labelcolor").map(Value::from));
        attrs.insert("value_color", opt_str(json, "valuecolor").map(Value::from));
        attrs.insert("item", item.as_ref().map(|i| Value::from(i.name())));

        let mut children = None;
        let mut linked_page = None;

        match self.kind {
            WidgetKind::Chart => {
                let period = opt_str(json, "period");
                let mut url = format!("{}?", server.resources().charts);
                if let Some(item) = &item {
                    let selector = if item.kind() == ItemKind::Group { "groups" } else { "items" };
                    url.push_str(&format!("{selector}={}", item.name()));
                }
                if let Some(period) = period {
                    url.push_str(&format!("&period={period}"));
                }
                attrs.insert("service", opt_str(json, "service").map(Value::from));
                attrs.insert("period", period.map(Value::from));
                attrs.insert("refresh", Some(Value::Int(json_int(json, "refresh", 0)?)));
                attrs.insert("url", Some(Value::Text(url)));
            }
            WidgetKind::Frame => {
                if let Some(raw) = json.get("widgets") {
                    let mut list = Vec::new();
                    for data in as_array(raw) {
                        if let Some(child) = server.create_or_update_widget(page, data)? {
                            list.push(child);
                        }
                    }
                    children = Some(list);
                }
            }
            WidgetKind::Group | WidgetKind::Text => {
                let linked = match json.get("linkedPage").filter(|v| !v.is_null()) {
                    Some(data) => Some(server.create_or_update_page(page.sitemap(), data, Some(page))?),
                    None => None,
                };
                attrs.insert("linked_page", linked.as_ref().map(|p| Value::from(p.id())));
                linked_page = Some(linked.as_ref().map(Arc::downgrade));
            }
            WidgetKind::Image => {
                let linked = json.get("linkedPage").and_then(|p| opt_str(p, "id"));
                attrs.insert("linked_page", linked.map(Value::from));
                attrs.insert("url", Some(Value::from(required_str(json, "widget", "url")?)));
                attrs.insert("refresh", Some(Value::Int(json_int(json, "refresh", 0)?)));
            }
            WidgetKind::Selection | WidgetKind::Switch => {
                let mapping = Mapping::from_json(json.get("mappings"));
                // Without a bracketed value, show the label of the
                // mapping entry matching the item state.
                let has_value = attrs.get("value").is_some_and(Option::is_some);
                if let (Some(mapping), Some(item), false) = (&mapping, &item, has_value) {
                    if !mapping.is_empty() && item.state().is_some() {
                        let label = mapping.label_for(&item.encoded_state());
                        attrs.insert("value", label.map(Value::from));
                    }
                }
                attrs.insert("mapping", mapping.map(Value::from));
            }
            WidgetKind::Setpoint => {
                attrs.insert("min_value", Some(json_decimal(json, "widget", "minValue")?.into()));
                attrs.insert("max_value", Some(json_decimal(json, "widget", "maxValue")?.into()));
                attrs.insert("step", Some(json_decimal(json, "widget", "step")?.into()));
            }
            WidgetKind::Slider => {
                attrs.insert("min_value", Some(Decimal::ZERO.into()));
                attrs.insert("max_value", Some(Decimal::ONE_HUNDRED.into()));
                attrs.insert("step", Some(Decimal::ONE.into()));
                attrs.insert("send_frequency", Some(Value::Int(json_int(json, "sendFrequency", 0)?)));
                attrs.insert(
                    "switch_support",
                    Some(Value::Bool(json_bool(json, "switchSupport").unwrap_or(false))),
                );
            }
            WidgetKind::Video => {
                attrs.insert("url", Some(Value::from(required_str(json, "widget", "url")?)));
                attrs.insert("encoding", opt_str(json, "encoding").map(Value::from));
            }
            WidgetKind::Webview => {
                attrs.insert("height", Some(Value::Int(json_int(json, "height", 1)?)));
                attrs.insert("url", Some(Value::from(required_str(json, "widget", "url")?)));
            }
            WidgetKind::Colorpicker | WidgetKind::Mapview => {}
        }

        Ok(Resolved {
            attrs,
            item,
            children,
            linked_page,
        })
    }

    // ── Accessors ──

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> WidgetKind {
        self.kind
    }

    /// The page this widget was first created on.
    pub fn parent(&self) -> Option<Arc<Page>> {
        self.parent.upgrade()
    }

    pub fn item(&self) -> Option<Arc<Item>> {
        self.tracked.read(|s| s.item.clone())
    }

    /// Nested widgets (frames only).
    pub fn children(&self) -> Vec<Arc<Widget>> {
        self.tracked.read(|s| s.children.clone())
    }

    /// Child page opened by a group or text widget.
    pub fn linked_page(&self) -> Option<Arc<Page>> {
        self.tracked
            .read(|s| s.linked_page.as_ref().and_then(Weak::upgrade))
    }

    pub fn attr(&self, key: &str) -> Option<Value> {
        self.tracked.read(|s| s.attrs.get(key).cloned())
    }

    pub fn label(&self) -> Option<String> {
        self.text_attr("label")
    }

    pub fn value(&self) -> Option<String> {
        self.text_attr("value")
    }

    fn text_attr(&self, key: &str) -> Option<String> {
        self.attr(key).and_then(|v| v.as_str().map(str::to_owned))
    }

    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.tracked.read(|s| s.attrs.snapshot())
    }

    // ── Observers ──

    /// Subscribe to this widget and to its item. The subscription moves
    /// along when a later payload binds the widget to a different item.
    pub fn subscribe<O: Observer + 'static>(&self, observer: &Arc<O>) {
        self.tracked.subscribe(observer);
        if let Some(item) = self.item() {
            item.subscribe(observer);
        }
    }

    pub fn unsubscribe<O: Observer + 'static>(&self, observer: &Arc<O>) -> bool {
        if let Some(item) = self.item() {
            item.unsubscribe(observer);
        }
        self.tracked.unsubscribe(observer)
    }
}
