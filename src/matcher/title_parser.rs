//! Parses free-form media titles into artist, track and featured artists
//! for metadata searches.

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedTitle {
    pub artist: String,
    pub track: String,
    pub featuring: Vec<String>,
    pub is_remix: bool,
    pub remix_artist: Option<String>,
    pub raw: String,
}

lazy_static::lazy_static! {
    static ref DASH: Regex = Regex::new(r"^(.+?)\s+[-–—|]\s+(.+)$").unwrap();
    static ref QUOTED_BY: Regex = Regex::new(r#"(?i)^["“](.+?)["”]\s+by\s+(.+)$"#).unwrap();
    static ref QUOTED: Regex = Regex::new(r#"^(.+?)\s*["“](.+?)["”]"#).unwrap();
    static ref BY: Regex = Regex::new(r"(?i)^(.+?)\s+by\s+(.+)$").unwrap();
    static ref FEAT_BRACKETED: Regex =
        Regex::new(r"(?i)\s*[\(\[]\s*(?:feat\.?|ft\.?|featuring)\s*([^\)\]]+)[\)\]]").unwrap();
    static ref FEAT_INLINE: Regex =
        Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring)\s+(.+?)(\s+[-–—]\s+|$)").unwrap();
    static ref VIDEO_SUFFIX: Regex = Regex::new(
        r"(?i)(?:\s*[\(\[]\s*(?:official\s*(?:video|audio|music\s*video|lyric\s*video|visualizer)|lyric\s*video|lyrics?|audio|video|hd|hq|4k|1080p|720p|m/v|mv)\s*[\)\]]|\s+(?:hd|hq|4k|1080p|720p))\s*$"
    ).unwrap();
    static ref REMIX: Regex =
        Regex::new(r"(?i)[\(\[]\s*(.+?)\s*(?:remix|edit|mix|bootleg|flip|rework)\s*[\)\]]").unwrap();
    static ref ARTIST_SPLIT: Regex = Regex::new(r"(?i)\s*[,&]\s*|\s+and\s+").unwrap();
    static ref TOPIC_SUFFIX: Regex = Regex::new(r"(?i)\s*[-–—]\s*topic\s*$").unwrap();
    static ref VEVO_SUFFIX: Regex = Regex::new(r"(?i)VEVO\s*$").unwrap();
    static ref OFFICIAL_SUFFIX: Regex = Regex::new(r"(?i)\s+official\s*$").unwrap();
    static ref YEAR_SUFFIX: Regex = Regex::new(r"\s*[\(\[]\d{4}[\)\]]\s*$").unwrap();
    static ref REMASTER_SUFFIX: Regex = Regex::new(
        r"(?i)\s*[\(\[]?\s*(?:\d{4}\s+)?remaster(?:ed)?(?:\s+\d{4})?\s*[\)\]]?\s*$"
    ).unwrap();
    static ref TRACK_WORDS: Regex =
        Regex::new(r"(?i)remix|version|edit|mix|remaster|live|acoustic|instrumental").unwrap();
    static ref MULTI_SPACE: Regex = Regex::new(r"\s+").unwrap();
}

pub fn parse_title(title: &str) -> ParsedTitle {
    let mut result = ParsedTitle {
        raw: title.to_string(),
        ..Default::default()
    };

    let (mut cleaned, featuring) = extract_featuring(&clean_title(title));
    result.featuring = featuring;

    if let Some(caps) = REMIX.captures(&cleaned) {
        result.is_remix = true;
        result.remix_artist = Some(caps[1].trim().to_string()).filter(|s| !s.is_empty());
        cleaned = REMIX.replace_all(&cleaned, "").trim().to_string();
    }

    if let Some(caps) = DASH.captures(&cleaned) {
        let mut artist = caps[1].trim().to_string();
        let mut track = caps[2].trim().to_string();
        // "Track - Artist" is occasionally used instead.
        if looks_like_artist_name(&track) && !looks_like_artist_name(&artist) {
            std::mem::swap(&mut artist, &mut track);
        }
        result.artist = clean_artist(&artist);
        result.track = clean_track(&track);
        return result;
    }

    if let Some(caps) = QUOTED_BY.captures(&cleaned) {
        result.track = clean_track(caps[1].trim());
        result.artist = clean_artist(caps[2].trim());
        return result;
    }

    if let Some(caps) = QUOTED.captures(&cleaned) {
        result.artist = clean_artist(caps[1].trim());
        result.track = clean_track(caps[2].trim());
        return result;
    }

    if let Some(caps) = BY.captures(&cleaned) {
        result.track = clean_track(caps[1].trim());
        result.artist = clean_artist(caps[2].trim());
        return result;
    }

    result.track = clean_track(&cleaned);
    result
}

/// Drops trailing video markers like "(Official Video)" or "HD".
pub fn clean_title(title: &str) -> String {
    let cleaned = VIDEO_SUFFIX.replace_all(title, "");
    MULTI_SPACE.replace_all(&cleaned, " ").trim().to_string()
}

fn extract_featuring(title: &str) -> (String, Vec<String>) {
    let mut featuring = Vec::new();

    for caps in FEAT_BRACKETED.captures_iter(title) {
        featuring.extend(split_artists(&caps[1]));
    }
    let cleaned = FEAT_BRACKETED.replace_all(title, "").into_owned();

    for caps in FEAT_INLINE.captures_iter(&cleaned) {
        featuring.extend(split_artists(&caps[1]));
    }
    let cleaned = FEAT_INLINE.replace_all(&cleaned, "$2").into_owned();

    (cleaned.trim().to_string(), featuring)
}

fn split_artists(artists: &str) -> Vec<String> {
    ARTIST_SPLIT
        .split(artists)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strips channel decorations: "- Topic", "VEVO", "Official".
pub fn clean_artist(artist: &str) -> String {
    let artist = TOPIC_SUFFIX.replace_all(artist, "");
    let artist = VEVO_SUFFIX.replace_all(&artist, "");
    let artist = OFFICIAL_SUFFIX.replace_all(&artist, "");
    MULTI_SPACE.replace_all(&artist, " ").trim().to_string()
}

fn clean_track(track: &str) -> String {
    let track = YEAR_SUFFIX.replace_all(track, "");
    let track = REMASTER_SUFFIX.replace_all(&track, "");
    MULTI_SPACE.replace_all(&track, " ").trim().to_string()
}

fn looks_like_artist_name(s: &str) -> bool {
    s.chars().count() <= 40 && !TRACK_WORDS.is_match(s) && !s.contains('(') && !s.contains('[')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artist_dash_track() {
        let parsed = parse_title("Daft Punk - One More Time (Official Video)");
        assert_eq!(parsed.artist, "Daft Punk");
        assert_eq!(parsed.track, "One More Time");
        assert!(parsed.featuring.is_empty());
        assert!(!parsed.is_remix);
    }

    #[test]
    fn test_hyphenated_artist_is_not_split() {
        let parsed = parse_title("Jay-Z - Empire State of Mind");
        assert_eq!(parsed.artist, "Jay-Z");
        assert_eq!(parsed.track, "Empire State of Mind");
    }

    #[test]
    fn test_featuring_extraction() {
        let parsed = parse_title("Daft Punk - Get Lucky (feat. Pharrell Williams & Nile Rodgers)");
        assert_eq!(parsed.artist, "Daft Punk");
        assert_eq!(parsed.track, "Get Lucky");
        assert_eq!(parsed.featuring, vec!["Pharrell Williams", "Nile Rodgers"]);

        let parsed = parse_title("Calvin Harris ft. Rihanna - This Is What You Came For");
        assert_eq!(parsed.artist, "Calvin Harris");
        assert_eq!(parsed.track, "This Is What You Came For");
        assert_eq!(parsed.featuring, vec!["Rihanna"]);
    }

    #[test]
    fn test_remix_detection() {
        let parsed = parse_title("Artist - Song (Someone Remix)");
        assert!(parsed.is_remix);
        assert_eq!(parsed.remix_artist.as_deref(), Some("Someone"));
        assert_eq!(parsed.track, "Song");
    }

    #[test]
    fn test_by_formats() {
        let parsed = parse_title("Hallelujah by Jeff Buckley");
        assert_eq!(parsed.track, "Hallelujah");
        assert_eq!(parsed.artist, "Jeff Buckley");

        let parsed = parse_title("\"Hurt\" by Johnny Cash");
        assert_eq!(parsed.track, "Hurt");
        assert_eq!(parsed.artist, "Johnny Cash");
    }

    #[test]
    fn test_quoted_track() {
        let parsed = parse_title("Adele \"Hello\"");
        assert_eq!(parsed.artist, "Adele");
        assert_eq!(parsed.track, "Hello");
    }

    #[test]
    fn test_fallback_uses_whole_title() {
        let parsed = parse_title("Bohemian Rhapsody (Remastered 2011)");
        assert_eq!(parsed.artist, "");
        assert_eq!(parsed.track, "Bohemian Rhapsody");
    }

    #[test]
    fn test_clean_artist() {
        assert_eq!(clean_artist("Queen - Topic"), "Queen");
        assert_eq!(clean_artist("AdeleVEVO"), "Adele");
        assert_eq!(clean_artist("Muse Official"), "Muse");
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("Song [HD]"), "Song");
        assert_eq!(clean_title("Song (Official Music Video)"), "Song");
        assert_eq!(clean_title("Song   4K"), "Song");
    }
}
