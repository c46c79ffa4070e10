//! Interaction components
//!
//! Each component is a thin layer of form state and sequencing over the
//! external services in [`crate::services`]. One set of them lives in
//! every browser session (see [`crate::session`]).

pub mod artist_search;
pub mod auth_context;
pub mod auth_gate;
pub mod composer;
pub mod debounce;
pub mod profile_editor;
pub mod public_wall;
pub mod session_client;

pub use artist_search::{ArtistCard, ArtistSearch, CardAction, SearchResponse, SearchStatus};
pub use auth_context::{AuthContext, AuthSnapshot};
pub use auth_gate::{AuthGate, HandleAvailability};
pub use composer::{Composer, ComposerState, CompanionSearch};
pub use profile_editor::ProfileEditor;
pub use public_wall::{load_wall, WallView};
pub use session_client::SessionClient;
