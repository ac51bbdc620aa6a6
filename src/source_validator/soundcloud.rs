use super::{path_segments, query_param, MediaType, SourceType, ValidationResult};
use regex::Regex;
use url::Url;

pub(super) const HOSTS: &[&str] = &[
    "soundcloud.com",
    "on.soundcloud.com",
    "api.soundcloud.com",
    "w.soundcloud.com",
];

const RESERVED_PATHS: &[&str] = &[
    "discover",
    "stream",
    "you",
    "search",
    "upload",
    "people",
    "groups",
    "tags",
    "popular",
    "charts",
    "terms-of-use",
    "privacy",
];

const ARTIST_SUBPAGES: &[&str] = &[
    "likes",
    "tracks",
    "albums",
    "playlists",
    "reposts",
    "followers",
    "following",
];

lazy_static::lazy_static! {
    static ref USERNAME: Regex = Regex::new(r"^[A-Za-z0-9_-]{3,25}$").unwrap();
    static ref SLUG: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
    static ref SHORT_CODE: Regex = Regex::new(r"^[A-Za-z0-9]{5,20}$").unwrap();
    static ref NUMERIC_ID: Regex = Regex::new(r"^[0-9]+$").unwrap();
}

fn invalid(reason: &str) -> ValidationResult {
    ValidationResult::invalid(SourceType::Soundcloud, reason)
}

pub(super) fn recognize(url: &Url, host: &str) -> ValidationResult {
    match host {
        "on.soundcloud.com" => recognize_short_link(url),
        "api.soundcloud.com" => recognize_api(url),
        "w.soundcloud.com" => recognize_widget(url),
        _ => recognize_web(url),
    }
}

fn recognize_web(url: &Url) -> ValidationResult {
    let segments = path_segments(url);
    let Some(user) = segments.first() else {
        return invalid("missing SoundCloud path");
    };

    if RESERVED_PATHS.contains(&user.to_lowercase().as_str()) {
        return invalid("reserved SoundCloud path");
    }
    if !USERNAME.is_match(user) {
        return invalid("invalid SoundCloud username");
    }

    let artist = || {
        ValidationResult::valid(
            SourceType::Soundcloud,
            MediaType::Artist,
            *user,
            format!("https://soundcloud.com/{}", user),
        )
    };

    match segments.as_slice() {
        [_] => artist(),
        [_, page] if ARTIST_SUBPAGES.contains(page) || *page == "sets" => artist(),
        [_, "sets", slug] => {
            if !SLUG.is_match(slug) {
                return invalid("invalid SoundCloud playlist slug");
            }
            ValidationResult::valid(
                SourceType::Soundcloud,
                MediaType::Playlist,
                format!("{}/sets/{}", user, slug),
                format!("https://soundcloud.com/{}/sets/{}", user, slug),
            )
        }
        [_, slug] => {
            if !SLUG.is_match(slug) {
                return invalid("invalid SoundCloud track slug");
            }
            ValidationResult::valid(
                SourceType::Soundcloud,
                MediaType::Track,
                format!("{}/{}", user, slug),
                format!("https://soundcloud.com/{}/{}", user, slug),
            )
        }
        _ => invalid("unrecognized SoundCloud URL"),
    }
}

fn recognize_short_link(url: &Url) -> ValidationResult {
    match path_segments(url).as_slice() {
        [code] if SHORT_CODE.is_match(code) => ValidationResult::valid(
            SourceType::Soundcloud,
            MediaType::Track,
            *code,
            format!("https://on.soundcloud.com/{}", code),
        ),
        _ => invalid("invalid SoundCloud short link"),
    }
}

fn recognize_api(url: &Url) -> ValidationResult {
    let (kind, id) = match path_segments(url).as_slice() {
        [kind, id, ..] => (kind.to_string(), id.to_string()),
        _ => return invalid("unrecognized SoundCloud API URL"),
    };
    if !NUMERIC_ID.is_match(&id) {
        return invalid("invalid SoundCloud API id");
    }
    let media_type = match kind.as_str() {
        "tracks" => MediaType::Track,
        "playlists" => MediaType::Playlist,
        "users" => MediaType::Artist,
        _ => return invalid("unrecognized SoundCloud API URL"),
    };
    ValidationResult::valid(
        SourceType::Soundcloud,
        media_type,
        id.clone(),
        format!("https://api.soundcloud.com/{}/{}", kind, id),
    )
}

fn recognize_widget(url: &Url) -> ValidationResult {
    let Some(inner) = query_param(url, "url") else {
        return invalid("SoundCloud widget URL has no embedded url");
    };
    match Url::parse(&inner) {
        Ok(inner_url)
            if inner_url.host_str().map(|h| h.to_lowercase()).as_deref()
                == Some("api.soundcloud.com") =>
        {
            recognize_api(&inner_url)
        }
        _ => invalid("SoundCloud widget URL does not embed an API URL"),
    }
}
