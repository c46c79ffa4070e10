//! Read-only wall of a user's attendance records

use chrono::NaiveDate;
use heardlive_common::country::country_name;
use heardlive_common::handle::validate_handle;
use heardlive_common::models::{
    sort_by_followers_desc, ExperienceWithArtist, Profile, SocialLink, PLACEHOLDER_ARTIST_IMAGE,
};
use heardlive_common::Result;
use serde::Serialize;
use uuid::Uuid;

use crate::services::DataStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WallCountry {
    pub code: String,
    pub name: String,
    pub flag_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WallEntry {
    pub experience_id: Uuid,
    pub artist_id: String,
    pub artist_name: String,
    pub image_url: String,
    pub followers: i64,
    pub genres: Vec<String>,
    pub event_name: Option<String>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub rating: Option<u8>,
}

impl From<&ExperienceWithArtist> for WallEntry {
    fn from(record: &ExperienceWithArtist) -> Self {
        let fields = &record.experience.fields;
        Self {
            experience_id: record.experience.id,
            artist_id: record.artist.id.clone(),
            artist_name: record.artist.name.clone(),
            image_url: record
                .artist
                .image_url
                .clone()
                .unwrap_or_else(|| PLACEHOLDER_ARTIST_IMAGE.to_string()),
            followers: record.artist.followers.unwrap_or(0),
            genres: record.artist.top_genres().to_vec(),
            event_name: fields.event_name.clone(),
            venue: fields.venue.clone(),
            city: fields.city.clone(),
            event_date: fields.event_date,
            rating: fields.rating,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wall {
    pub display_name: String,
    pub handle: Option<String>,
    pub avatar_url: String,
    pub country: Option<WallCountry>,
    pub social_links: Vec<SocialLink>,
    pub entries: Vec<WallEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WallView {
    NotFound,
    Found(Wall),
}

impl Wall {
    fn new(profile: &Profile, mut records: Vec<ExperienceWithArtist>) -> Self {
        sort_by_followers_desc(&mut records);

        let country = profile.country.as_deref().map(|code| WallCountry {
            code: code.to_ascii_uppercase(),
            name: country_name(code)
                .map(str::to_string)
                .unwrap_or_else(|| code.to_ascii_uppercase()),
            flag_url: profile.flag_url(),
        });

        Self {
            display_name: profile.display_name().to_string(),
            handle: profile.username.clone(),
            avatar_url: profile.avatar_or_generated(),
            country,
            social_links: profile.social_links(),
            entries: records.iter().map(WallEntry::from).collect(),
        }
    }
}

/// Resolve a wall path segment and load its records
///
/// Accepts a handle, or a profile id for users without one. Anything that
/// cannot name a profile is not found without querying the store.
pub async fn load_wall(store: &dyn DataStore, segment: &str) -> Result<WallView> {
    let profile = if let Ok(id) = Uuid::parse_str(segment) {
        store.profile_by_id(id).await?
    } else if validate_handle(segment).is_ok() {
        store.profile_by_handle(segment).await?
    } else {
        tracing::debug!(segment = %segment, "Not a handle; wall not found");
        return Ok(WallView::NotFound);
    };

    let Some(profile) = profile else {
        return Ok(WallView::NotFound);
    };

    let records = store.experiences_for_user(profile.id).await?;
    Ok(WallView::Found(Wall::new(&profile, records)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryBackend;

    #[tokio::test]
    async fn test_unknown_handle_makes_no_record_request() {
        let backend = MemoryBackend::new();
        let view = load_wall(&backend, "unknownhandle123").await.unwrap();

        assert_eq!(view, WallView::NotFound);
        assert_eq!(backend.calls("profile_by_handle").await, 1);
        assert_eq!(backend.calls("experiences_for_user").await, 0);
    }

    #[tokio::test]
    async fn test_impossible_handle_skips_store() {
        let backend = MemoryBackend::new();
        let view = load_wall(&backend, "favicon.ico").await.unwrap();

        assert_eq!(view, WallView::NotFound);
        assert_eq!(backend.calls("profile_by_handle").await, 0);
    }

    #[test]
    fn test_wall_orders_by_followers() {
        use heardlive_common::models::{ArtistRow, Experience, ExperienceFields};

        let record = |name: &str, followers: Option<i64>| ExperienceWithArtist {
            experience: Experience {
                id: Uuid::new_v4(),
                user_id: Uuid::nil(),
                artist_id: name.to_string(),
                fields: ExperienceFields::default(),
                created_at: None,
            },
            artist: ArtistRow {
                id: name.to_string(),
                name: name.to_string(),
                image_url: None,
                genres: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                followers,
                spotify_url: None,
                popularity: None,
            },
        };

        let profile = Profile {
            id: Uuid::nil(),
            username: Some("fan".into()),
            country: Some("be".into()),
            ..Default::default()
        };
        let wall = Wall::new(
            &profile,
            vec![record("small", Some(5)), record("none", None), record("big", Some(50))],
        );

        let names: Vec<_> = wall.entries.iter().map(|e| e.artist_name.as_str()).collect();
        assert_eq!(names, vec!["big", "small", "none"]);
        assert_eq!(wall.entries[0].genres.len(), 3);
        assert_eq!(wall.entries[0].image_url, PLACEHOLDER_ARTIST_IMAGE);
        assert_eq!(wall.country.unwrap().name, "Belgium");
    }
}
