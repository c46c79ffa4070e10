//! UI routes
//!
//! The search and profile pages are static HTML driven by `app.js`
//! against the JSON API. Walls are rendered on the server so a shared
//! link shows content without JavaScript.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};

use crate::components::public_wall::{Wall, WallEntry};
use crate::components::{load_wall, WallView};
use crate::AppState;

const INDEX_HTML: &str = include_str!("../ui/index.html");
const PROFILE_HTML: &str = include_str!("../ui/profile.html");
const APP_JS: &str = include_str!("../ui/app.js");
const STYLE_CSS: &str = include_str!("../ui/style.css");

/// Build UI routes
pub fn ui_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(serve_index))
        .route("/profile", get(serve_profile))
        .route("/static/app.js", get(serve_app_js))
        .route("/static/style.css", get(serve_style_css))
        .route("/:handle", get(wall_page))
}

/// GET /
pub async fn serve_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /profile
pub async fn serve_profile() -> Html<&'static str> {
    Html(PROFILE_HTML)
}

/// GET /static/app.js
pub async fn serve_app_js() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/javascript")],
        APP_JS,
    )
        .into_response()
}

/// GET /static/style.css
pub async fn serve_style_css() -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/css")], STYLE_CSS).into_response()
}

/// GET /:handle
pub async fn wall_page(State(state): State<AppState>, Path(handle): Path<String>) -> Response {
    match load_wall(state.backends.store.as_ref(), &handle).await {
        Ok(WallView::Found(wall)) => Html(render_wall(&wall)).into_response(),
        Ok(WallView::NotFound) => {
            (StatusCode::NOT_FOUND, Html(render_not_found(&handle))).into_response()
        }
        Err(e) => {
            tracing::warn!(handle = %handle, error = %e, "Failed to load wall");
            (
                StatusCode::BAD_GATEWAY,
                Html(page("Unavailable", &format!(
                    "<section class=\"empty\"><h1>Something went wrong</h1><p>{}</p></section>",
                    escape(&e.user_message())
                ))),
            )
                .into_response()
        }
    }
}

/// Minimal HTML escaping for text and attribute values
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} · I heard this live</title>
    <link rel="stylesheet" href="/static/style.css">
</head>
<body>
    <header class="site-header"><a href="/" class="brand">I heard this live</a></header>
    <main>
{body}
    </main>
</body>
</html>"#,
        title = escape(title),
        body = body
    )
}

fn render_not_found(handle: &str) -> String {
    page(
        "Not found",
        &format!(
            "<section class=\"empty\"><h1>Profile not found</h1><p>Nobody goes by @{} here yet.</p><a class=\"button\" href=\"/\">Back to search</a></section>",
            escape(handle)
        ),
    )
}

fn render_entry(entry: &WallEntry) -> String {
    let mut details = String::new();
    if let Some(event) = &entry.event_name {
        details.push_str(&format!("<p class=\"event\">{}</p>", escape(event)));
    }
    if let Some(city) = &entry.city {
        details.push_str(&format!("<p class=\"city\">{}</p>", escape(city)));
    }
    let genres: String = entry
        .genres
        .iter()
        .map(|g| format!("<span class=\"genre\">{}</span>", escape(g)))
        .collect();

    format!(
        r#"<article class="tile">
    <img src="{image}" alt="{name}">
    <div class="overlay">
        <h3>{name}</h3>
        <p class="followers">{followers} followers</p>
        {details}
        <div class="genres">{genres}</div>
    </div>
</article>"#,
        image = escape(&entry.image_url),
        name = escape(&entry.artist_name),
        followers = format_count(entry.followers),
        details = details,
        genres = genres
    )
}

fn render_wall(wall: &Wall) -> String {
    let handle = wall
        .handle
        .as_deref()
        .map(|h| format!("<p class=\"handle\">@{}</p>", escape(h)))
        .unwrap_or_default();

    let country = wall
        .country
        .as_ref()
        .map(|c| {
            let flag = c
                .flag_url
                .as_deref()
                .map(|url| format!("<img class=\"flag\" src=\"{}\" alt=\"{}\">", escape(url), escape(&c.code)))
                .unwrap_or_default();
            format!("<p class=\"country\">{}{}</p>", flag, escape(&c.name))
        })
        .unwrap_or_default();

    let links: String = wall
        .social_links
        .iter()
        .map(|link| {
            format!(
                "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a>",
                escape(&link.url),
                escape(link.platform)
            )
        })
        .collect();

    let tiles: String = if wall.entries.is_empty() {
        "<p class=\"empty\">No live experiences yet.</p>".to_string()
    } else {
        wall.entries.iter().map(render_entry).collect()
    };

    let body = format!(
        r#"<section class="wall-header">
    <img class="avatar" src="{avatar}" alt="{name}">
    <div>
        <h1>{name}</h1>
        {handle}
        {country}
        <nav class="social">{links}</nav>
    </div>
</section>
<section class="grid">
{tiles}
</section>"#,
        avatar = escape(&wall.avatar_url),
        name = escape(&wall.display_name),
        handle = handle,
        country = country,
        links = links,
        tiles = tiles
    );

    page(&wall.display_name, &body)
}

/// Thousands separators: 9000000 -> "9,000,000"
fn format_count(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"
        );
        assert_eq!(escape("Tom & \"Jerry\""), "Tom &amp; &quot;Jerry&quot;");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(9_000_000), "9,000,000");
    }

    #[test]
    fn test_not_found_page_escapes_handle() {
        let html = render_not_found("<b>");
        assert!(html.contains("@&lt;b&gt;"));
        assert!(!html.contains("<b>"));
    }
}
