//! Heuristic artist/track extraction from free-form media titles.

use regex::Regex;

const SEPARATORS: &[&str] = &[" - ", " \u{2014} ", " \u{2013} ", " | "];

lazy_static::lazy_static! {
    static ref PROMO_SUFFIXES: Vec<Regex> = [
        r"(?i)\s*\(Official.*?\)",
        r"(?i)\s*\(Lyric.*?\)",
        r"(?i)\s*\(Audio.*?\)",
        r"(?i)\s*\(Music Video.*?\)",
        r"(?i)\s*\(Visualizer.*?\)",
        r"(?i)\s*\[Official.*?\]",
        r"(?i)\s*\[HD\]",
        r"(?i)\s*\[HQ\]",
        r"(?i)\s*\[4K\]",
        r"(?i)\s*\[Lyrics\]",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
}

/// Removes promotional markers such as "(Official Video)" or "[HD]".
pub fn clean_track_name(track: &str) -> String {
    PROMO_SUFFIXES
        .iter()
        .fold(track.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
        .trim()
        .to_string()
}

/// Splits a title into (artist, track).
///
/// Tries "Artist <sep> Track" with each separator in order. Without a
/// separator, the uploader (then channel) becomes the artist.
pub fn parse_artist_track(
    title: &str,
    uploader: Option<&str>,
    channel: Option<&str>,
) -> (String, String) {
    for sep in SEPARATORS {
        if let Some(idx) = title.find(sep) {
            if idx > 0 {
                let artist = title[..idx].trim().to_string();
                let track = clean_track_name(&title[idx + sep.len()..]);
                return (artist, track);
            }
        }
    }

    let artist = uploader
        .filter(|u| !u.trim().is_empty())
        .or(channel)
        .unwrap_or_default()
        .trim()
        .to_string();
    (artist, clean_track_name(title))
}
