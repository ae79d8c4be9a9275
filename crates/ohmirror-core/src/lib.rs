//! Live in-memory mirror of an openHAB server.
//!
//! `ohmirror-core` turns the REST representation of sitemaps, pages,
//! widgets and items into a tree of shared entities and keeps it up to
//! date with per-page long-polling. Presentation code never talks to
//! the network: it subscribes [`Observer`]s to entities and receives
//! `(changed, deleted)` attribute diffs.
//!
//! - **[`Server`]**: session root. Discovers resources, owns the
//!   id-keyed registries and the background poll workers, and fires
//!   termination callbacks when the connection is lost.
//! - **[`Page`] / [`Widget`] / [`Item`]**: mirrored entities. Each
//!   holds a [`ChangeSet`] of attributes; every mutation drains it and
//!   pushes the diff to live observers.
//! - **[`ItemKind`]**: per-type state coercion (`decode`, `encode`,
//!   `validate`) and the commands each type accepts.
//! - **[`ItemCommand`]**: commands sent to items, with optimistic
//!   local updates where the item type allows it.
//!
//! ```no_run
//! use ohmirror_core::{RecordingObserver, Server, ServerConfig};
//!
//! # async fn demo() -> Result<(), ohmirror_core::CoreError> {
//! let mut config = ServerConfig::for_host("openhab.lan", 8080)?;
//! config.poll_pages = true;
//!
//! let server = Server::connect(config).await?;
//! let home = server.open_sitemap("default").await?;
//!
//! let observer = RecordingObserver::new();
//! home.subscribe(&observer);
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod observer;
pub mod server;
pub mod store;
mod sync;

// ── Primary re-exports ──────────────────────────────────────────
pub use command::ItemCommand;
pub use config::{Credentials, ProxySetting, ServerConfig};
pub use convert::split_label;
pub use error::CoreError;
pub use observer::{Observer, ObserverSet, RecordingObserver};
pub use server::Server;
pub use store::{ChangeSet, Diff};

// ── Model re-exports ────────────────────────────────────────────
pub use model::{
    Hsb, Item, ItemKind, Mapping, MappingKey, Page, Sitemap, Value, Widget, WidgetKind,
};
