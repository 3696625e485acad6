//! Ephemeral editor drafts: per-venue field overrides applied to the
//! combined view before an approval is persisted.
//!
//! Drafts live only in memory and the store is bounded: past 1024 venues
//! the least-recently-updated draft is evicted on insert.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::FieldSource;

const DEFAULT_CAPACITY: usize = 1024;

/// One overridden field with the provenance it replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftField {
    pub value: String,
    pub original_source: FieldSource,
}

/// All of one editor's overrides for a venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub editor_id: i64,
    pub fields: BTreeMap<String, DraftField>,
    pub updated_at: DateTime<Utc>,
}

/// Reader-writer-locked draft map, bounded by LRU-on-update eviction.
pub struct DraftStore {
    drafts: RwLock<HashMap<i64, Draft>>,
    capacity: usize,
}

impl Default for DraftStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl DraftStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            drafts: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Insert or update one field of a venue's draft.
    pub async fn set_field(
        &self,
        venue_id: i64,
        editor_id: i64,
        field: impl Into<String>,
        value: impl Into<String>,
        original_source: FieldSource,
    ) {
        let mut drafts = self.drafts.write().await;
        let draft = drafts.entry(venue_id).or_insert_with(|| Draft {
            editor_id,
            fields: BTreeMap::new(),
            updated_at: Utc::now(),
        });
        draft.editor_id = editor_id;
        draft.fields.insert(
            field.into(),
            DraftField {
                value: value.into(),
                original_source,
            },
        );
        draft.updated_at = Utc::now();

        if drafts.len() > self.capacity {
            if let Some(oldest) = drafts
                .iter()
                .min_by_key(|(_, d)| d.updated_at)
                .map(|(id, _)| *id)
            {
                drafts.remove(&oldest);
                debug!(venue_id = oldest, "evicted least-recently-updated draft");
            }
        }
    }

    pub async fn get(&self, venue_id: i64) -> Option<Draft> {
        self.drafts.read().await.get(&venue_id).cloned()
    }

    /// Field values only, for merging into approval data.
    pub async fn overrides(&self, venue_id: i64) -> BTreeMap<String, String> {
        self.drafts
            .read()
            .await
            .get(&venue_id)
            .map(|d| {
                d.fields
                    .iter()
                    .map(|(k, f)| (k.clone(), f.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop the draft once the venue reaches a terminal state.
    pub async fn discard(&self, venue_id: i64) -> bool {
        self.drafts.write().await.remove(&venue_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.drafts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_and_discard() {
        let store = DraftStore::default();
        store
            .set_field(1, 10, "name", "Edited Name", FieldSource::Submitted)
            .await;
        store
            .set_field(1, 10, "phone", "+15035550111", FieldSource::LookedUp)
            .await;

        let draft = store.get(1).await.unwrap();
        assert_eq!(draft.editor_id, 10);
        assert_eq!(draft.fields.len(), 2);
        assert_eq!(draft.fields["name"].value, "Edited Name");

        let overrides = store.overrides(1).await;
        assert_eq!(overrides["phone"], "+15035550111");

        assert!(store.discard(1).await);
        assert!(store.get(1).await.is_none());
        assert!(!store.discard(1).await);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_updated() {
        let store = DraftStore::with_capacity(2);
        store
            .set_field(1, 10, "name", "a", FieldSource::Submitted)
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .set_field(2, 10, "name", "b", FieldSource::Submitted)
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        // Touch venue 1 so venue 2 becomes the eviction candidate.
        store
            .set_field(1, 10, "phone", "x", FieldSource::Submitted)
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .set_field(3, 10, "name", "c", FieldSource::Submitted)
            .await;

        assert_eq!(store.len().await, 2);
        assert!(store.get(2).await.is_none());
        assert!(store.get(1).await.is_some());
        assert!(store.get(3).await.is_some());
    }
}
