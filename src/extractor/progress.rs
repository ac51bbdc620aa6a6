//! Parsing of the tool's `--newline --progress` stdout lines.

use serde::Serialize;

/// Coarse stage reported alongside the percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorStage {
    Downloading,
    Converting,
    Finalizing,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExtractorProgress {
    /// 0.0 - 100.0
    pub percent: f32,
    pub stage: ExtractorStage,
}

/// Parses one stdout line.
///
/// `[download]  42.5% of 3.2MiB at 1.1MiB/s ETA 00:02` yields a downloading
/// update, a `Destination:` line from the audio post-processor marks
/// conversion, and `Deleting original file` marks the final step.
pub fn parse_progress_line(line: &str) -> Option<ExtractorProgress> {
    let line = line.trim();

    if line.contains("Deleting original file") {
        return Some(ExtractorProgress {
            percent: 100.0,
            stage: ExtractorStage::Finalizing,
        });
    }

    if let Some(rest) = line.strip_prefix("[download]") {
        let percent = rest
            .split_whitespace()
            .next()
            .and_then(|field| field.strip_suffix('%'))
            .and_then(|value| value.parse::<f32>().ok())?;
        return Some(ExtractorProgress {
            percent: percent.clamp(0.0, 100.0),
            stage: ExtractorStage::Downloading,
        });
    }

    if line.starts_with("[ExtractAudio]") && line.contains("Destination:") {
        return Some(ExtractorProgress {
            percent: 100.0,
            stage: ExtractorStage::Converting,
        });
    }

    None
}
