//! HTTP API handlers for heardlive-web

pub mod auth;
pub mod composer;
pub mod health;
pub mod profile;
pub mod search;
pub mod sse;
pub mod ui;
pub mod wall;

pub use auth::auth_routes;
pub use composer::composer_routes;
pub use health::health_routes;
pub use profile::profile_routes;
pub use search::search_routes;
pub use sse::event_stream;
pub use ui::ui_routes;
pub use wall::wall_routes;
