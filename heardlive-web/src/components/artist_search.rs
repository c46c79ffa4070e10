//! Debounced artist search against the catalog

use heardlive_common::models::{CatalogArtist, ExperienceWithArtist};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::auth_context::experience_for_artist;
use super::debounce::{Debounced, Debouncer};
use crate::services::Catalog;

/// What a result card offers the user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CardAction {
    Add,
    Edit { experience_id: Uuid },
}

/// One search result as rendered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistCard {
    pub id: String,
    pub name: String,
    pub image_url: String,
    pub followers: u64,
    pub genres: Vec<String>,
    pub catalog_url: Option<String>,
    pub action: CardAction,
}

impl ArtistCard {
    pub fn new(artist: &CatalogArtist, experiences: &[ExperienceWithArtist]) -> Self {
        let action = match experience_for_artist(experiences, &artist.id) {
            Some(existing) => CardAction::Edit {
                experience_id: existing.experience.id,
            },
            None => CardAction::Add,
        };

        Self {
            id: artist.id.clone(),
            name: artist.name.clone(),
            image_url: artist.image_or_placeholder().to_string(),
            followers: artist.followers,
            genres: artist.top_genres().to_vec(),
            catalog_url: artist.external_url.clone(),
            action,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    /// Fresh results for this query
    Results,
    /// Input was empty; results cleared without a lookup
    Cleared,
    /// A newer keystroke owns the results
    Superseded,
    /// Lookup failed; previous results kept
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub status: SearchStatus,
    pub loading: bool,
    pub cards: Vec<ArtistCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<String>,
}

pub struct ArtistSearch {
    catalog: Arc<dyn Catalog>,
    debouncer: Debouncer,
    limit: usize,
    results: RwLock<Vec<CatalogArtist>>,
}

impl ArtistSearch {
    pub fn new(catalog: Arc<dyn Catalog>, debounce: Duration, limit: usize) -> Self {
        Self {
            catalog,
            debouncer: Debouncer::new(debounce),
            limit,
            results: RwLock::new(Vec::new()),
        }
    }

    /// Handle one keystroke's worth of input
    ///
    /// `experiences` decides whether each card offers add or edit.
    pub async fn search(&self, query: &str, experiences: &[ExperienceWithArtist]) -> SearchResponse {
        let query = query.trim();

        if query.is_empty() {
            self.debouncer.cancel();
            self.results.write().await.clear();
            return self.respond(SearchStatus::Cleared, experiences, None).await;
        }

        let outcome = self
            .debouncer
            .run(|| self.catalog.search_artists(query, self.limit))
            .await;

        match outcome {
            Debounced::Latest(Ok(artists)) => {
                *self.results.write().await = artists;
                self.respond(SearchStatus::Results, experiences, None).await
            }
            Debounced::Latest(Err(e)) => {
                tracing::warn!(query = %query, error = %e, "Artist search failed");
                self.respond(SearchStatus::Failed, experiences, Some(e.user_message()))
                    .await
            }
            Debounced::Superseded | Debounced::Stale => {
                self.respond(SearchStatus::Superseded, experiences, None).await
            }
        }
    }

    async fn respond(
        &self,
        status: SearchStatus,
        experiences: &[ExperienceWithArtist],
        notification: Option<String>,
    ) -> SearchResponse {
        SearchResponse {
            status,
            loading: self.debouncer.is_loading(),
            cards: self.cards(experiences).await,
            notification,
        }
    }

    pub async fn cards(&self, experiences: &[ExperienceWithArtist]) -> Vec<ArtistCard> {
        self.results
            .read()
            .await
            .iter()
            .map(|artist| ArtistCard::new(artist, experiences))
            .collect()
    }

    /// A displayed result, for opening the composer on it
    pub async fn result(&self, artist_id: &str) -> Option<CatalogArtist> {
        self.results
            .read()
            .await
            .iter()
            .find(|a| a.id == artist_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::StaticCatalog;
    use async_trait::async_trait;
    use heardlive_common::{Error, ExternalService, Result};
    use std::sync::atomic::{AtomicBool, Ordering};

    const WINDOW: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_clears_without_request() {
        let catalog = Arc::new(StaticCatalog::demo());
        let search = ArtistSearch::new(catalog.clone(), WINDOW, 10);

        let response = search.search("   ", &[]).await;
        assert_eq!(response.status, SearchStatus::Cleared);
        assert!(response.cards.is_empty());
        assert_eq!(catalog.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keystroke_burst_issues_one_request() {
        let catalog = Arc::new(StaticCatalog::demo());
        let search = Arc::new(ArtistSearch::new(catalog.clone(), WINDOW, 10));

        let mut handles = Vec::new();
        for prefix in ["d", "da", "daf", "daft"] {
            let search = search.clone();
            handles.push(tokio::spawn(async move { search.search(prefix, &[]).await }));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let mut statuses = Vec::new();
        for handle in handles {
            statuses.push(handle.await.unwrap().status);
        }

        assert_eq!(catalog.request_count(), 1);
        assert_eq!(statuses.last(), Some(&SearchStatus::Results));
        let cards = search.cards(&[]).await;
        assert_eq!(cards[0].name, "Daft Punk");
        assert_eq!(cards[0].action, CardAction::Add);
    }

    struct FlakyCatalog {
        inner: StaticCatalog,
        failing: AtomicBool,
    }

    #[async_trait]
    impl Catalog for FlakyCatalog {
        async fn search_artists(&self, query: &str, limit: usize) -> Result<Vec<CatalogArtist>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::service(ExternalService::Catalog, "HTTP 503"));
            }
            self.inner.search_artists(query, limit).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_previous_results() {
        let catalog = Arc::new(FlakyCatalog {
            inner: StaticCatalog::demo(),
            failing: AtomicBool::new(false),
        });
        let search = ArtistSearch::new(catalog.clone(), WINDOW, 10);

        let first = search.search("coldplay", &[]).await;
        assert_eq!(first.cards.len(), 1);

        catalog.failing.store(true, Ordering::SeqCst);
        let second = search.search("avicii", &[]).await;
        assert_eq!(second.status, SearchStatus::Failed);
        assert!(second.notification.unwrap().contains("catalog"));
        assert_eq!(second.cards[0].name, "Coldplay");
    }
}
