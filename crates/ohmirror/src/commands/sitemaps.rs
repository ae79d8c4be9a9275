//! Sitemap listing.

use serde::Serialize;
use tabled::Tabled;

use ohmirror_core::{Server, Sitemap};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Tabled)]
struct SitemapRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Link")]
    link: String,
}

impl From<&Sitemap> for SitemapRow {
    fn from(s: &Sitemap) -> Self {
        Self {
            name: s.name().to_owned(),
            label: s.label().to_owned(),
            link: s.link().to_string(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(server: &Server, global: &GlobalOpts) -> Result<(), CliError> {
    let rows: Vec<SitemapRow> = server
        .load_sitemaps()
        .await?
        .iter()
        .map(|s| SitemapRow::from(s.as_ref()))
        .collect();

    let out = output::render_list(
        &global.output,
        &rows,
        SitemapRow::clone,
        |r| r.name.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
