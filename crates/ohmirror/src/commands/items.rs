//! Item listing.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use ohmirror_core::{Item, ItemKind, Server};

use crate::cli::{GlobalOpts, ItemsArgs};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Tabled)]
struct ItemRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    #[serde(rename = "type")]
    kind: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "State")]
    state: String,
}

impl From<&Arc<Item>> for ItemRow {
    fn from(item: &Arc<Item>) -> Self {
        Self {
            name: item.name().to_owned(),
            kind: item.type_name().to_owned(),
            label: item.label().unwrap_or_default(),
            state: item.encoded_state(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(server: &Server, args: &ItemsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let kind = args
        .kind
        .as_deref()
        .map(|raw| {
            ItemKind::from_type(raw).ok_or_else(|| CliError::Validation {
                field: "type".into(),
                reason: format!("unknown item type '{raw}'"),
            })
        })
        .transpose()?;

    server.load_items().await?;
    let rows: Vec<ItemRow> = server
        .items()
        .iter()
        .filter(|item| kind.is_none_or(|k| item.kind() == k))
        .filter(|item| {
            args.filter
                .as_deref()
                .is_none_or(|f| item.name().contains(f))
        })
        .map(ItemRow::from)
        .collect();

    let out = output::render_list(&global.output, &rows, ItemRow::clone, |r| {
        r.name.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
