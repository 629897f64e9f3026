//! Preview cards for the cover and story pages, with throttled image loading.

use bytes::Bytes;
use futures::future::join_all;
use std::future::Future;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{ImageKey, StoryPage};

/// Load state of one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardStatus {
    Loading,
    Loaded { bytes: Bytes },
    Failed { reason: String, retryable: bool },
}

/// One cover or page card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewCard {
    pub key: ImageKey,
    pub text: String,
    /// Rendered but obscured
    pub locked: bool,
    pub status: CardStatus,
}

/// Ordered set of preview cards: cover first, then pages in story order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewBoard {
    cards: Vec<PreviewCard>,
}

impl PreviewBoard {
    /// Build cards for `pages`; page cards at index `visible_count` and beyond are locked.
    pub fn render(pages: &[StoryPage], visible_count: Option<usize>) -> Self {
        let visible = visible_count.unwrap_or(usize::MAX);

        let cover = PreviewCard {
            key: ImageKey::Cover,
            text: String::new(),
            locked: false,
            status: CardStatus::Loading,
        };

        let cards = std::iter::once(cover)
            .chain(pages.iter().enumerate().map(|(index, page)| PreviewCard {
                key: ImageKey::Page(page.page_number),
                text: page.text.clone(),
                locked: index >= visible,
                status: CardStatus::Loading,
            }))
            .collect();

        Self { cards }
    }

    pub fn cards(&self) -> &[PreviewCard] {
        &self.cards
    }

    pub fn card(&self, key: ImageKey) -> Option<&PreviewCard> {
        self.cards.iter().find(|card| card.key == key)
    }

    /// Page cards that are locked
    pub fn locked_pages(&self) -> Vec<u32> {
        self.cards
            .iter()
            .filter(|card| card.locked)
            .filter_map(|card| card.key.page_number())
            .collect()
    }

    /// Pages whose card offers a manual retry
    pub fn retryable_pages(&self) -> Vec<u32> {
        self.cards
            .iter()
            .filter(|card| matches!(card.status, CardStatus::Failed { retryable: true, .. }))
            .filter_map(|card| card.key.page_number())
            .collect()
    }

    pub fn set_status(&mut self, key: ImageKey, status: CardStatus) {
        match self.cards.iter_mut().find(|card| card.key == key) {
            Some(card) => card.status = status,
            None => debug!("No preview card for {}", key),
        }
    }

    /// The page has no illustration; offer a retry.
    pub fn mark_missing(&mut self, key: ImageKey, reason: impl Into<String>) {
        self.set_status(
            key,
            CardStatus::Failed {
                reason: reason.into(),
                retryable: true,
            },
        );
    }

    /// Apply a finished load to its card
    pub fn apply(&mut self, outcome: LoadOutcome) {
        let status = match outcome.result {
            Ok(bytes) => CardStatus::Loaded { bytes },
            Err(e) => {
                warn!("Preview for {} failed to load: {}", outcome.key, e);
                CardStatus::Failed {
                    reason: e.to_string(),
                    retryable: outcome.key != ImageKey::Cover,
                }
            }
        };
        self.set_status(outcome.key, status);
    }

    /// Bytes already loaded into a card, if any
    pub fn captured(&self, key: ImageKey) -> Option<Bytes> {
        match &self.card(key)?.status {
            CardStatus::Loaded { bytes } => Some(bytes.clone()),
            _ => None,
        }
    }
}

/// An image to load into a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJob {
    pub key: ImageKey,
    pub url: String,
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub key: ImageKey,
    pub result: Result<Bytes>,
}

/// Run `load` for every job with at most `max_in_flight` loads at once.
///
/// Outcomes come back in job order, whatever order the loads finish in.
pub async fn load_images<F, Fut>(jobs: Vec<LoadJob>, max_in_flight: usize, load: F) -> Vec<LoadOutcome>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Bytes>>,
{
    let semaphore = Semaphore::new(max_in_flight.max(1));
    let semaphore = &semaphore;
    let load = &load;

    let loads = jobs.into_iter().map(|job| async move {
        // The semaphore is never closed, so acquire cannot fail
        let _permit = semaphore.acquire().await.ok();
        debug!("Loading preview for {}", job.key);
        LoadOutcome {
            key: job.key,
            result: load(job.url).await,
        }
    });

    join_all(loads).await
}
