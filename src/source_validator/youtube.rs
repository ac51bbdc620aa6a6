use super::{path_segments, query_param, MediaType, SourceType, ValidationResult};
use regex::Regex;
use url::Url;

pub(super) const HOSTS: &[&str] = &["youtube.com", "youtu.be", "music.youtube.com"];

lazy_static::lazy_static! {
    static ref VIDEO_ID: Regex = Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap();
    static ref PLAYLIST_ID: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

fn track(video_id: &str) -> ValidationResult {
    if !VIDEO_ID.is_match(video_id) {
        return ValidationResult::invalid(SourceType::Youtube, "invalid YouTube video ID");
    }
    ValidationResult::valid(
        SourceType::Youtube,
        MediaType::Track,
        video_id,
        format!("https://www.youtube.com/watch?v={}", video_id),
    )
}

fn playlist(list_id: &str) -> ValidationResult {
    if !PLAYLIST_ID.is_match(list_id) {
        return ValidationResult::invalid(SourceType::Youtube, "invalid YouTube playlist ID");
    }
    ValidationResult::valid(
        SourceType::Youtube,
        MediaType::Playlist,
        list_id,
        format!("https://www.youtube.com/playlist?list={}", list_id),
    )
}

fn channel(id: &str, canonical_path: String) -> ValidationResult {
    ValidationResult::valid(
        SourceType::Youtube,
        MediaType::Channel,
        id,
        format!("https://www.youtube.com/{}", canonical_path),
    )
}

pub(super) fn recognize(url: &Url, host: &str) -> ValidationResult {
    let segments = path_segments(url);

    if host == "youtu.be" {
        return match segments.first() {
            Some(id) => track(id),
            None => ValidationResult::invalid(SourceType::Youtube, "missing YouTube video ID"),
        };
    }

    match segments.as_slice() {
        ["watch"] => match (query_param(url, "v"), query_param(url, "list")) {
            (Some(v), _) => track(&v),
            (None, Some(list)) => playlist(&list),
            (None, None) => {
                ValidationResult::invalid(SourceType::Youtube, "missing YouTube video ID")
            }
        },
        ["playlist"] => match query_param(url, "list") {
            Some(list) => playlist(&list),
            None => ValidationResult::invalid(SourceType::Youtube, "missing YouTube playlist ID"),
        },
        ["shorts" | "embed" | "v" | "live", id, ..] => track(id),
        [handle] if handle.starts_with('@') && handle.len() > 1 => {
            channel(handle, handle.to_string())
        }
        [kind @ ("channel" | "c" | "user"), name, ..] => {
            channel(name, format!("{}/{}", kind, name))
        }
        _ => ValidationResult::invalid(SourceType::Youtube, "unrecognized YouTube URL"),
    }
}
