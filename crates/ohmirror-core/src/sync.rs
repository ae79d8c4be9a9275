// ── Long-poll workers ──
//
// One worker per watched page or item. Each iteration issues a
// long-poll request carrying the previous tracking id, applies the
// answer and goes again. Empty answers and read timeouts are the
// server's normal "nothing happened"; a refused or reset connection
// ends the whole session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ohmirror_api::{JsonResponse, RestClient};

use crate::error::CoreError;
use crate::model::{Item, Page};
use crate::server::{Server, WeakServer};

/// Pause after an HTTP or decode error before polling again.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Entity a worker keeps in sync.
#[derive(Debug, Clone)]
pub(crate) enum PollTarget {
    Page(Arc<Page>),
    Item(Arc<Item>),
}

impl PollTarget {
    async fn fetch(&self, client: &RestClient) -> Result<JsonResponse, CoreError> {
        match self {
            Self::Page(page) => page.fetch(client, true).await,
            Self::Item(item) => item.fetch(true).await,
        }
    }

    fn apply(&self, server: &Server, resp: &JsonResponse) -> Result<(), CoreError> {
        match self {
            Self::Page(page) => page.apply_response(server, resp),
            Self::Item(item) => item.apply_response(resp),
        }
    }
}

impl fmt::Display for PollTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page(page) => write!(f, "page {}", page.id()),
            Self::Item(item) => write!(f, "item {}", item.name()),
        }
    }
}

/// Poll `target` until the session dies, the worker is cancelled or
/// the last `Server` handle is dropped.
///
/// The worker holds only a weak session handle while waiting on the
/// network, so it never keeps a dropped session alive for a full
/// long-poll window.
pub(crate) async fn poll_loop(server: WeakServer, target: PollTarget, cancel: CancellationToken) {
    debug!(%target, "poll worker started");

    loop {
        let Some(client) = server.upgrade().map(|s| s.client().clone()) else {
            break;
        };

        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = target.fetch(&client) => result,
        };

        let Some(session) = server.upgrade() else {
            break;
        };

        match fetched.and_then(|resp| target.apply(&session, &resp)) {
            Ok(()) => debug!(%target, "applied update"),
            Err(e) => match e.as_api() {
                Some(ohmirror_api::Error::EmptyResponse) => {
                    debug!(%target, "empty long-poll response");
                }
                Some(ohmirror_api::Error::Timeout { .. }) => {
                    debug!(%target, "long-poll timed out");
                }
                Some(api) if api.is_fatal_for_session() => {
                    info!(%target, error = %e, "connection lost");
                    session.terminate();
                    break;
                }
                _ => {
                    warn!(%target, error = %e, "poll failed, retrying");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            },
        }

        if !session.is_alive() {
            break;
        }
    }

    debug!(%target, "poll worker stopped");
}
