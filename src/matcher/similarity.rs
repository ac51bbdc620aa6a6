//! Scoring of metadata-service candidates against parsed media metadata.

use regex::Regex;

/// Weights for the three score components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub artist: f64,
    pub track: f64,
    pub duration: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            artist: 0.4,
            track: 0.4,
            duration: 0.2,
        }
    }
}

/// Durations within this many seconds of each other score 100.
const DURATION_TOLERANCE_SECS: f64 = 10.0;
const DURATION_PENALTY_PER_SEC: f64 = 5.0;
const NEUTRAL_DURATION_SCORE: f64 = 50.0;
const FEATURING_BONUS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_score(overall: f64, auto_match_threshold: f64) -> Self {
        if overall >= auto_match_threshold {
            Confidence::High
        } else if overall >= 70.0 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Component scores, all on a 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScore {
    pub overall: f64,
    pub artist: f64,
    pub track: f64,
    pub duration: f64,
    /// Fraction of featured artists found in the candidate's credit.
    pub featuring: f64,
}

lazy_static::lazy_static! {
    static ref NOISE_WORDS: Regex =
        Regex::new(r"(?i)\b(the|a|an|and|or|of|in|on|at|to|for)\b").unwrap();
    static ref NON_ALPHANUMERIC: Regex = Regex::new(r"[^\p{L}\p{N}\s]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Lowercases, folds accents, drops noise words and punctuation.
pub fn normalize_string(s: &str) -> String {
    let lowered: String = s
        .to_lowercase()
        .chars()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .map(fold_diacritic)
        .collect();
    let without_noise = NOISE_WORDS.replace_all(&lowered, " ");
    let alphanumeric = NON_ALPHANUMERIC.replace_all(&without_noise, " ");
    WHITESPACE.replace_all(&alphanumeric, " ").trim().to_string()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'č' => 'c',
        'ď' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => 'e',
        'ğ' => 'g',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ı' => 'i',
        'ł' => 'l',
        'ñ' | 'ń' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => 'o',
        'ř' => 'r',
        'ś' | 'š' | 'ş' => 's',
        'ť' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => 'u',
        'ý' | 'ÿ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

/// Minimum number of single-character edits turning `a` into `b`.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev_row: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr_row: Vec<usize> = vec![0; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_chars.len()]
}

/// Normalized Levenshtein similarity on a 0-100 scale.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_string(a);
    let b = normalize_string(b);
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return 100.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }
    if a == b {
        return 100.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    let distance = levenshtein_distance(&a, &b);
    ((1.0 - distance as f64 / max_len as f64) * 100.0).max(0.0)
}

/// 100 within tolerance, then 5 points off per extra second. Unknown
/// durations are neutral.
pub fn duration_score(a_ms: Option<i64>, b_ms: Option<i64>) -> f64 {
    let (a, b) = match (a_ms, b_ms) {
        (Some(a), Some(b)) if a > 0 && b > 0 => (a, b),
        _ => return NEUTRAL_DURATION_SCORE,
    };
    let diff_secs = (a - b).abs() as f64 / 1000.0;
    if diff_secs <= DURATION_TOLERANCE_SECS {
        return 100.0;
    }
    (100.0 - (diff_secs - DURATION_TOLERANCE_SECS) * DURATION_PENALTY_PER_SEC).max(0.0)
}

/// Fraction of `featuring` names contained in `artist_credit`.
pub fn featuring_match(featuring: &[String], artist_credit: &str) -> f64 {
    if featuring.is_empty() {
        return 0.0;
    }
    let credit = normalize_string(artist_credit);
    let matched = featuring
        .iter()
        .map(|f| normalize_string(f))
        .filter(|f| !f.is_empty() && credit.contains(f.as_str()))
        .count();
    matched as f64 / featuring.len() as f64
}

#[allow(clippy::too_many_arguments)]
pub fn calculate_score(
    parsed_artist: &str,
    parsed_track: &str,
    featuring: &[String],
    duration_ms: Option<i64>,
    candidate_artist: &str,
    candidate_artist_credit: &str,
    candidate_title: &str,
    candidate_duration_ms: Option<i64>,
    weights: &ScoreWeights,
) -> MatchScore {
    let artist = string_similarity(parsed_artist, candidate_artist);
    let track = string_similarity(parsed_track, candidate_title);
    let duration = duration_score(duration_ms, candidate_duration_ms);

    let mut overall = artist * weights.artist + track * weights.track + duration * weights.duration;
    let featuring = featuring_match(featuring, candidate_artist_credit);
    if featuring > 0.0 {
        overall = (overall + featuring * FEATURING_BONUS).min(100.0);
    }

    MatchScore {
        overall,
        artist,
        track,
        duration,
        featuring,
    }
}
