//! End-to-end scenarios over the components and the in-memory backend
//!
//! Each test walks one user-visible story: recording an experience,
//! visiting walls, racing sign-ups for one handle, typing faster than
//! the catalog answers, and recovering from a half-finished avatar
//! upload.

use async_trait::async_trait;
use heardlive_common::models::CatalogArtist;
use heardlive_common::{Error, Result};
use heardlive_web::components::artist_search::CardAction;
use heardlive_web::components::auth_gate::{GateForm, SignUpForm};
use heardlive_web::components::composer::{ComposerMode, FormFields};
use heardlive_web::components::{
    load_wall, ArtistSearch, AuthContext, AuthGate, Composer, ComposerState, ProfileEditor,
    SearchStatus, SessionClient, WallView,
};
use heardlive_web::services::memory::{MemoryBackend, StaticCatalog};
use heardlive_web::services::Catalog;
use std::sync::Arc;
use std::time::Duration;

fn auth_for(backend: &Arc<MemoryBackend>) -> AuthContext {
    let client = Arc::new(SessionClient::new(backend.clone()));
    AuthContext::start(client, backend.clone())
}

fn sign_up_form(email: &str, handle: &str) -> GateForm {
    GateForm::SignUp(SignUpForm {
        email: email.to_string(),
        password: "secret123".to_string(),
        username: handle.to_string(),
        name: Some("Rave Fan".to_string()),
    })
}

async fn signed_up(backend: &Arc<MemoryBackend>, email: &str, handle: &str) -> AuthContext {
    let auth = auth_for(backend);
    AuthGate::new(&auth, backend.clone())
        .submit(sign_up_form(email, handle), |_| {})
        .await
        .unwrap();
    auth
}

fn tomorrowland() -> FormFields {
    FormFields {
        event_name: "Tomorrowland 2023".to_string(),
        venue: "De Schorre".to_string(),
        city: "Boom".to_string(),
        country: "BE".to_string(),
        event_date: "2023-07-21".to_string(),
        rating: Some(5),
        notes: String::new(),
    }
}

#[tokio::test]
async fn test_record_then_edit_daft_punk_experience() {
    let backend = Arc::new(MemoryBackend::new());
    let auth = signed_up(&backend, "fan@example.com", "rave_fan").await;

    let search = ArtistSearch::new(Arc::new(StaticCatalog::demo()), Duration::from_millis(5), 10);
    let response = search.search("Daft Punk", &auth.experiences().await).await;
    assert_eq!(response.status, SearchStatus::Results);
    let card = &response.cards[0];
    assert_eq!(card.name, "Daft Punk");
    assert_eq!(card.action, CardAction::Add);

    let artist = search.result(&card.id).await.unwrap();
    let artist_id = artist.id.clone();

    let composer = Composer::new(backend.clone());
    composer.open(artist.clone(), &auth).await.unwrap();
    composer.set_fields(tomorrowland()).await.unwrap();
    let state = composer.submit(&auth).await.unwrap();
    assert_eq!(state, ComposerState::Closed);

    assert_eq!(backend.calls("insert_experience").await, 1);
    let row = backend.artist(&artist_id).await.expect("artist row written");
    assert_eq!(row.name, "Daft Punk");

    let experiences = auth.experiences().await;
    assert_eq!(experiences.len(), 1);
    assert_eq!(
        experiences[0].experience.fields.event_name.as_deref(),
        Some("Tomorrowland 2023")
    );

    // The same card now offers editing the record just written
    let cards = search.cards(&experiences).await;
    let experience_id = experiences[0].experience.id;
    assert_eq!(cards[0].action, CardAction::Edit { experience_id });

    // Reopening prefills from the stored record and updates in place
    match composer.open(artist, &auth).await.unwrap() {
        ComposerState::Open { mode, form, .. } => {
            assert_eq!(mode, ComposerMode::Edit { experience_id });
            assert_eq!(form.fields.event_name, "Tomorrowland 2023");
            assert_eq!(form.fields.event_date, "2023-07-21");
        }
        other => panic!("expected open composer, got {:?}", other),
    }
    composer
        .set_fields(FormFields {
            rating: Some(4),
            ..tomorrowland()
        })
        .await
        .unwrap();
    composer.submit(&auth).await.unwrap();

    assert_eq!(backend.calls("insert_experience").await, 1);
    assert_eq!(backend.calls("update_experience").await, 1);
    assert_eq!(auth.experiences().await[0].experience.fields.rating, Some(4));
}

#[tokio::test]
async fn test_wall_shows_recorded_experience() {
    let backend = Arc::new(MemoryBackend::new());
    let auth = signed_up(&backend, "fan@example.com", "rave_fan").await;

    let catalog = StaticCatalog::demo();
    let artist = catalog
        .search_artists("daft", 1)
        .await
        .unwrap()
        .remove(0);

    let composer = Composer::new(backend.clone());
    composer.open(artist, &auth).await.unwrap();
    composer.set_fields(tomorrowland()).await.unwrap();
    composer.submit(&auth).await.unwrap();

    match load_wall(backend.as_ref(), "rave_fan").await.unwrap() {
        WallView::Found(wall) => {
            assert_eq!(wall.display_name, "Rave Fan");
            assert_eq!(wall.entries.len(), 1);
            assert_eq!(wall.entries[0].artist_name, "Daft Punk");
            assert_eq!(wall.entries[0].event_name.as_deref(), Some("Tomorrowland 2023"));
        }
        WallView::NotFound => panic!("wall should exist"),
    }
}

#[tokio::test]
async fn test_unknown_handle_makes_no_experience_request() {
    let backend = Arc::new(MemoryBackend::new());

    let view = load_wall(backend.as_ref(), "unknownhandle123").await.unwrap();
    assert_eq!(view, WallView::NotFound);
    assert_eq!(backend.calls("profile_by_handle").await, 1);
    assert_eq!(backend.calls("experiences_for_user").await, 0);
}

#[tokio::test]
async fn test_concurrent_sign_ups_for_one_handle() {
    let backend = Arc::new(MemoryBackend::new());
    let first = auth_for(&backend);
    let second = auth_for(&backend);
    let first_gate = AuthGate::new(&first, backend.clone());
    let second_gate = AuthGate::new(&second, backend.clone());

    let (a, b) = tokio::join!(
        first_gate.submit(sign_up_form("one@example.com", "same_handle"), |_| {}),
        second_gate.submit(sign_up_form("two@example.com", "same_handle"), |_| {}),
    );

    let outcomes = [a, b];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let taken = outcomes
        .iter()
        .filter(|r| matches!(r, Err(Error::HandleTaken(h)) if h == "same_handle"))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(taken, 1);

    // Exactly one of the two browsers is still signed in
    let signed_in = [first.user().await, second.user().await]
        .iter()
        .filter(|u| u.is_some())
        .count();
    assert_eq!(signed_in, 1);
}

#[tokio::test]
async fn test_handle_race_loser_can_pick_another_handle() {
    let backend = Arc::new(MemoryBackend::new());
    let _winner = signed_up(&backend, "one@example.com", "same_handle").await;

    let loser = auth_for(&backend);
    let gate = AuthGate::new(&loser, backend.clone());
    let err = gate
        .submit(sign_up_form("two@example.com", "same_handle"), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HandleTaken(ref h) if h == "same_handle"));
    assert!(loser.user().await.is_none());

    // Same credentials, different handle: the identity is reused
    gate.submit(sign_up_form("two@example.com", "other_handle"), |_| {})
        .await
        .unwrap();

    let editor = ProfileEditor::load(&loser, backend.clone(), backend.clone(), 1024)
        .await
        .unwrap();
    assert_eq!(editor.profile().username.as_deref(), Some("other_handle"));
    assert!(matches!(
        load_wall(backend.as_ref(), "other_handle").await.unwrap(),
        WallView::Found(_)
    ));
}

/// Catalog whose answer time depends on the query
struct SlowCatalog {
    inner: StaticCatalog,
}

#[async_trait]
impl Catalog for SlowCatalog {
    async fn search_artists(&self, query: &str, limit: usize) -> Result<Vec<CatalogArtist>> {
        let delay = if query.starts_with("daft") { 2_000 } else { 10 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.inner.search_artists(query, limit).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_stale_catalog_answer_is_discarded() {
    let search = ArtistSearch::new(
        Arc::new(SlowCatalog {
            inner: StaticCatalog::demo(),
        }),
        Duration::from_millis(500),
        10,
    );

    let (slow, fast) = tokio::join!(search.search("daft", &[]), async {
        // Past the debounce window, while the first lookup is in flight
        tokio::time::sleep(Duration::from_millis(800)).await;
        search.search("avicii", &[]).await
    });

    assert_eq!(slow.status, SearchStatus::Superseded);
    assert_eq!(fast.status, SearchStatus::Results);

    let names: Vec<String> = search.cards(&[]).await.into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["Avicii".to_string()]);
}

#[tokio::test]
async fn test_avatar_removed_when_profile_update_fails() {
    let backend = Arc::new(MemoryBackend::new());
    let auth = signed_up(&backend, "fan@example.com", "rave_fan").await;

    let mut editor = ProfileEditor::load(&auth, backend.clone(), backend.clone(), 1024)
        .await
        .unwrap();

    backend.fail_operation(Some("set_avatar_url")).await;
    let err = editor
        .upload_avatar(vec![1, 2, 3], "image/jpeg")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Service { .. }));

    assert_eq!(backend.calls("upload").await, 1);
    assert_eq!(backend.calls("remove").await, 1);
    assert!(backend.object_paths().await.is_empty());
    assert!(editor.profile().avatar_url.is_none());
}
