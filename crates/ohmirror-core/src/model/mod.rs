// ── Mirrored entity model ──

pub mod color;
pub mod item;
pub mod mapping;
pub mod page;
pub mod sitemap;
pub mod value;
pub mod widget;

pub use color::{ColorParseError, Hsb};
pub use item::{Item, ItemKind};
pub use mapping::{Mapping, MappingKey};
pub use page::Page;
pub use sitemap::Sitemap;
pub use value::{DATETIME_FORMAT, Value};
pub use widget::{Widget, WidgetKind};
