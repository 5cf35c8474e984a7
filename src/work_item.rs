//! Work-item lookup service.
//!
//! The hub resolves `load-work-item` ids through an external tracker. This
//! module defines that boundary as [`WorkItemLookup`] and provides
//! [`StaticWorkItemLookup`], an in-memory catalog for demos and tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, RoomError};
use crate::protocol::WorkItem;

/// Resolves a work-item id to its full payload.
#[async_trait]
pub trait WorkItemLookup: Send + Sync {
    /// Fetch the item with the given id. May be slow.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::WorkItemNotFound`] if no such item exists.
    async fn fetch(&self, item_id: &str) -> Result<WorkItem>;
}

/// A fixed catalog of work items with optional artificial latency.
#[derive(Debug, Clone, Default)]
pub struct StaticWorkItemLookup {
    items: HashMap<String, WorkItem>,
    latency: Duration,
}

impl StaticWorkItemLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item, keyed by its id.
    #[must_use]
    pub fn with_item(mut self, item: WorkItem) -> Self {
        self.items.insert(item.id.clone(), item);
        self
    }

    /// Delay every fetch by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl WorkItemLookup for StaticWorkItemLookup {
    async fn fetch(&self, item_id: &str) -> Result<WorkItem> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let item = self
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| RoomError::WorkItemNotFound(item_id.to_string()));
        debug!(item_id, found = item.is_ok(), "work item lookup");
        item
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn story(id: &str) -> WorkItem {
        WorkItem {
            id: id.into(),
            kind: "User Story".into(),
            title: format!("Story {id}"),
            url: format!("https://tracker.example/items/{id}"),
            description_html: "<p>As a user…</p>".into(),
        }
    }

    #[tokio::test]
    async fn fetch_known_item() {
        let lookup = StaticWorkItemLookup::new().with_item(story("42"));
        let item = lookup.fetch("42").await.unwrap();
        assert_eq!(item.title, "Story 42");
    }

    #[tokio::test]
    async fn fetch_unknown_item() {
        let lookup = StaticWorkItemLookup::new().with_item(story("42"));
        let err = lookup.fetch("7").await.unwrap_err();
        assert!(matches!(err, RoomError::WorkItemNotFound(id) if id == "7"));
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_applied() {
        let lookup = StaticWorkItemLookup::new()
            .with_item(story("1"))
            .with_latency(Duration::from_secs(3));
        let started = tokio::time::Instant::now();
        lookup.fetch("1").await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
