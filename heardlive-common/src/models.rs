//! Domain models shared across heardlive
//!
//! Rows mirror the external store's tables (`profiles`, `artists`,
//! `user_artist_experiences`); the service only ever holds derived copies.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity key of a user (auth user id == profile id)
pub type UserId = Uuid;

/// Image shown when a catalog artist has no artwork
pub const PLACEHOLDER_ARTIST_IMAGE: &str =
    "https://placehold.co/400x400/1a1a1a/ffffff?text=Artist";

/// Number of genre tags shown on a card
pub const CARD_GENRE_COUNT: usize = 3;

// ============================================================================
// Identity
// ============================================================================

/// Authenticated identity as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl AuthUser {
    /// Part of the email before `@`, used as a fallback label
    pub fn email_local_part(&self) -> Option<&str> {
        self.email.as_deref().and_then(|e| e.split('@').next())
    }
}

/// Session issued by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) at which the access token expires
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    /// Seconds before expiry at which a session is treated as expired
    pub const EXPIRY_MARGIN_SECS: i64 = 60;

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now.timestamp() + Self::EXPIRY_MARGIN_SECS >= expires_at,
            None => false,
        }
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Public profile row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// ISO 3166-1 alpha-2 country code
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub twitter_url: Option<String>,
    #[serde(default)]
    pub spotify_url: Option<String>,
    #[serde(default)]
    pub soundcloud_url: Option<String>,
    #[serde(default)]
    pub youtube_url: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Link to one of the profile's social accounts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SocialLink {
    pub platform: &'static str,
    pub url: String,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.username.as_deref())
            .unwrap_or("")
    }

    /// Stored avatar, or a generated one from the display name
    pub fn avatar_or_generated(&self) -> String {
        match self.avatar_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => url.to_string(),
            None => format!(
                "https://ui-avatars.com/api/?name={}&background=random",
                urlencoding::encode(self.display_name())
            ),
        }
    }

    /// Path of this profile's wall (handle, or id before a handle is set)
    pub fn wall_path(&self) -> String {
        match self.username.as_deref() {
            Some(handle) if !handle.is_empty() => format!("/{}", handle),
            _ => format!("/{}", self.id),
        }
    }

    pub fn flag_url(&self) -> Option<String> {
        self.country
            .as_deref()
            .filter(|c| c.len() == 2)
            .map(|c| format!("https://flagcdn.com/24x18/{}.png", c.to_ascii_lowercase()))
    }

    pub fn social_links(&self) -> Vec<SocialLink> {
        [
            ("twitter", &self.twitter_url),
            ("spotify", &self.spotify_url),
            ("soundcloud", &self.soundcloud_url),
            ("youtube", &self.youtube_url),
        ]
        .into_iter()
        .filter_map(|(platform, url)| {
            url.as_ref()
                .filter(|u| !u.is_empty())
                .map(|u| SocialLink {
                    platform,
                    url: u.clone(),
                })
        })
        .collect()
    }

    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            id: self.id,
            username: self.username.clone(),
            name: self.name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Minimal profile used for companion lookup and display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Row inserted right after sign-up
#[derive(Debug, Clone, Serialize)]
pub struct NewProfile {
    pub id: UserId,
    pub username: String,
    pub name: Option<String>,
}

/// Full-form profile update; `None` clears the column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub country: Option<String>,
    pub twitter_url: Option<String>,
    pub spotify_url: Option<String>,
    pub soundcloud_url: Option<String>,
    pub youtube_url: Option<String>,
}

impl From<&Profile> for ProfileUpdate {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            username: profile.username.clone(),
            country: profile.country.clone(),
            twitter_url: profile.twitter_url.clone(),
            spotify_url: profile.spotify_url.clone(),
            soundcloud_url: profile.soundcloud_url.clone(),
            youtube_url: profile.youtube_url.clone(),
        }
    }
}

// ============================================================================
// Artists
// ============================================================================

/// Artwork reference returned by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogImage {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Artist as returned by the external catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogArtist {
    /// Catalog identifier (foreign key into the catalog namespace)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Vec<CatalogImage>,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub popularity: u32,
}

impl CatalogArtist {
    /// First (largest) image, or the placeholder
    pub fn image_or_placeholder(&self) -> &str {
        self.images
            .first()
            .map(|i| i.url.as_str())
            .unwrap_or(PLACEHOLDER_ARTIST_IMAGE)
    }

    pub fn top_genres(&self) -> &[String] {
        &self.genres[..self.genres.len().min(CARD_GENRE_COUNT)]
    }
}

/// Artist row in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub followers: Option<i64>,
    #[serde(default)]
    pub spotify_url: Option<String>,
    #[serde(default)]
    pub popularity: Option<i32>,
}

impl ArtistRow {
    pub fn top_genres(&self) -> &[String] {
        &self.genres[..self.genres.len().min(CARD_GENRE_COUNT)]
    }
}

impl From<&CatalogArtist> for ArtistRow {
    fn from(artist: &CatalogArtist) -> Self {
        Self {
            id: artist.id.clone(),
            name: artist.name.clone(),
            image_url: artist.images.first().map(|i| i.url.clone()),
            genres: artist.genres.clone(),
            followers: i64::try_from(artist.followers).ok(),
            spotify_url: artist.external_url.clone(),
            popularity: i32::try_from(artist.popularity).ok(),
        }
    }
}

impl From<&ArtistRow> for CatalogArtist {
    fn from(row: &ArtistRow) -> Self {
        Self {
            id: row.id.clone(),
            name: row.name.clone(),
            images: row
                .image_url
                .iter()
                .map(|url| CatalogImage {
                    url: url.clone(),
                    width: None,
                    height: None,
                })
                .collect(),
            followers: row.followers.and_then(|f| u64::try_from(f).ok()).unwrap_or(0),
            genres: row.genres.clone(),
            external_url: row.spotify_url.clone(),
            popularity: row.popularity.and_then(|p| u32::try_from(p).ok()).unwrap_or(0),
        }
    }
}

// ============================================================================
// Experiences (attendance records)
// ============================================================================

/// Mutable attributes of an attendance record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceFields {
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub event_date: Option<NaiveDate>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub companion_ids: Vec<UserId>,
}

/// Attendance record row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub id: Uuid,
    pub user_id: UserId,
    pub artist_id: String,
    #[serde(flatten)]
    pub fields: ExperienceFields,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Attendance record joined with its artist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceWithArtist {
    #[serde(flatten)]
    pub experience: Experience,
    pub artist: ArtistRow,
}

/// Attendance record to insert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewExperience {
    pub user_id: UserId,
    pub artist_id: String,
    #[serde(flatten)]
    pub fields: ExperienceFields,
}

/// Order wall entries by descending follower count (missing counts as 0)
///
/// The sort is stable so records with equal counts keep store order.
pub fn sort_by_followers_desc(experiences: &mut [ExperienceWithArtist]) {
    experiences.sort_by_key(|e| std::cmp::Reverse(e.artist.followers.unwrap_or(0)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn artist(id: &str, followers: Option<i64>) -> ArtistRow {
        ArtistRow {
            id: id.to_string(),
            name: id.to_string(),
            image_url: None,
            genres: vec![],
            followers,
            spotify_url: None,
            popularity: None,
        }
    }

    fn experience(artist: ArtistRow) -> ExperienceWithArtist {
        ExperienceWithArtist {
            experience: Experience {
                id: Uuid::new_v4(),
                user_id: Uuid::nil(),
                artist_id: artist.id.clone(),
                fields: ExperienceFields::default(),
                created_at: None,
            },
            artist,
        }
    }

    #[test]
    fn test_sort_by_followers_desc_treats_missing_as_zero() {
        let mut list = vec![
            experience(artist("small", Some(10))),
            experience(artist("unknown", None)),
            experience(artist("big", Some(1_000_000))),
            experience(artist("zero", Some(0))),
        ];
        sort_by_followers_desc(&mut list);
        let ids: Vec<_> = list.iter().map(|e| e.artist.id.as_str()).collect();
        assert_eq!(ids, vec!["big", "small", "unknown", "zero"]);
    }

    #[test]
    fn test_experience_with_artist_parses_embedded_join() {
        let row = json!({
            "id": "7c1f4b8e-3f5e-4a59-9a57-6c1b1d0f9a10",
            "user_id": "0b6f1c52-8f59-4c8b-9a0a-3f0d8f3e2a11",
            "artist_id": "4tZwfgrHOc3mvqYlEYSvVi",
            "event_name": "Tomorrowland 2023",
            "city": "Boom",
            "rating": 5,
            "event_date": "2023-07-21",
            "companion_ids": [],
            "created_at": "2023-08-01T12:00:00Z",
            "artist": {
                "id": "4tZwfgrHOc3mvqYlEYSvVi",
                "name": "Daft Punk",
                "genres": ["electro", "french house"],
                "followers": 9000000
            }
        });

        let parsed: ExperienceWithArtist = serde_json::from_value(row).unwrap();
        assert_eq!(parsed.experience.fields.event_name.as_deref(), Some("Tomorrowland 2023"));
        assert_eq!(parsed.experience.fields.city.as_deref(), Some("Boom"));
        assert_eq!(parsed.artist.name, "Daft Punk");
        assert_eq!(
            parsed.experience.fields.event_date,
            NaiveDate::from_ymd_opt(2023, 7, 21)
        );
    }

    #[test]
    fn test_profile_fallbacks() {
        let profile = Profile {
            id: Uuid::nil(),
            name: Some("Ada Lovelace".to_string()),
            country: Some("GB".to_string()),
            twitter_url: Some("https://x.com/ada".to_string()),
            youtube_url: Some(String::new()),
            ..Default::default()
        };

        assert!(profile.avatar_or_generated().contains("name=Ada%20Lovelace&"));
        assert_eq!(profile.wall_path(), format!("/{}", Uuid::nil()));
        assert_eq!(profile.flag_url().as_deref(), Some("https://flagcdn.com/24x18/gb.png"));

        let links = profile.social_links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].platform, "twitter");
    }

    #[test]
    fn test_generated_avatar_escapes_display_name() {
        let profile = Profile {
            name: Some("Drum & Bass #1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            profile.avatar_or_generated(),
            "https://ui-avatars.com/api/?name=Drum%20%26%20Bass%20%231&background=random"
        );

        let uploaded = Profile {
            avatar_url: Some("https://cdn.example.com/a.png".to_string()),
            ..profile
        };
        assert_eq!(uploaded.avatar_or_generated(), "https://cdn.example.com/a.png");
    }

    #[test]
    fn test_catalog_artist_card_helpers() {
        let artist = CatalogArtist {
            id: "a".to_string(),
            name: "A".to_string(),
            images: vec![],
            followers: 1,
            genres: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            external_url: None,
            popularity: 3,
        };
        assert_eq!(artist.image_or_placeholder(), PLACEHOLDER_ARTIST_IMAGE);
        assert_eq!(artist.top_genres().len(), 3);

        let row = ArtistRow::from(&artist);
        assert_eq!(row.followers, Some(1));
        assert_eq!(row.image_url, None);
    }

    #[test]
    fn test_session_expiry_margin() {
        let now = Utc::now();
        let session = AuthSession {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: Some(now.timestamp() + 30),
            user: AuthUser {
                id: Uuid::nil(),
                email: None,
                user_metadata: serde_json::Value::Null,
            },
        };
        assert!(session.is_expired_at(now));

        let fresh = AuthSession {
            expires_at: Some(now.timestamp() + 3600),
            ..session
        };
        assert!(!fresh.is_expired_at(now));
    }
}
