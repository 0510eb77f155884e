// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::*;
use std::path::Path;
use chrono::{ DateTime, FixedOffset, Utc };
use serde::Deserialize;

/// One row of `gopro_metadata.csv`: a clip cut out of a longer GoPro video.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GoProClipInfo {
    pub file: String,
    pub creation_time: String,
    /// Clip start within the source video, `m:ss.fff`.
    #[serde(alias = "original_start")]
    pub start: String,
    #[serde(alias = "original_end")]
    pub end: String,
}

/// Parses clip offsets written as `m:ss.fff` (also `h:mm:ss.fff` or plain seconds) into seconds.
pub fn parse_clip_offset(s: &str) -> Option<f64> {
    let mut secs = 0.0;
    for part in s.trim().split(':') {
        let v = part.parse::<f64>().ok()?;
        if !v.is_finite() || v < 0.0 { return None; }
        secs = secs * 60.0 + v;
    }
    Some(secs)
}

impl GoProClipInfo {
    pub fn creation_time(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(self.creation_time.trim()).ok()
    }

    /// Absolute start and end of the clip in µs since the epoch.
    pub fn span_us(&self) -> Option<(i64, i64)> {
        let t0 = self.creation_time()?.with_timezone(&Utc).timestamp_micros();
        let start = parse_clip_offset(&self.start)?;
        let end = parse_clip_offset(&self.end)?;
        Some((t0 + (start * 1e6).round() as i64, t0 + (end * 1e6).round() as i64))
    }

    pub fn overlaps(&self, start_us: i64, end_us: i64) -> bool {
        self.span_us().is_some_and(|(s, e)| s < end_us && e > start_us)
    }

    /// Creation time as `YYYY-mm-dd_HHMMSS`, shifted by `utc_offset_hours`.
    pub fn creation_label(&self, utc_offset_hours: i32) -> Option<String> {
        let tz = FixedOffset::east_opt(utc_offset_hours * 3600)?;
        Some(self.creation_time()?.with_timezone(&tz).format("%Y-%m-%d_%H%M%S").to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct GoProMetadata {
    pub clips: Vec<GoProClipInfo>,
}

impl GoProMetadata {
    pub const FILE_NAME: &'static str = "gopro_metadata.csv";

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(f)).map_err(|e| Error::new(e.kind(), format!("{}: {e}", path.as_ref().display())))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut clips = Vec::new();
        for row in csv.deserialize::<GoProClipInfo>() {
            let row = row?;
            if row.span_us().is_none() {
                log::warn!("{}: unreadable creation time or offsets", row.file);
            }
            clips.push(row);
        }
        Ok(Self { clips })
    }

    pub fn get(&self, file: &str) -> Option<&GoProClipInfo> {
        self.clips.iter().find(|x| x.file == file)
    }
}

impl From<Vec<GoProClipInfo>> for GoProMetadata {
    fn from(clips: Vec<GoProClipInfo>) -> Self { Self { clips } }
}

#[cfg(test)]
mod tests {
    use super::*;

    const META: &str = "file,creation_time,original_start,original_end\n\
                        GX010010_01.MP4,2022-05-10T08:00:00.000000Z,1:02.500,1:12.250\n\
                        GX010010_02.MP4,2022-05-10T08:00:00.000000Z,3:00.000,3:30.000\n";

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_clip_offset("1:02.500"), Some(62.5));
        assert_eq!(parse_clip_offset("0:07.5"), Some(7.5));
        assert_eq!(parse_clip_offset("1:00:00.000"), Some(3600.0));
        assert_eq!(parse_clip_offset("12.25"), Some(12.25));
        assert_eq!(parse_clip_offset("1:xx"), None);
    }

    #[test]
    fn reads_original_column_names() {
        let meta = GoProMetadata::from_reader(META.as_bytes()).unwrap();
        assert_eq!(meta.clips.len(), 2);
        let clip = meta.get("GX010010_01.MP4").unwrap();
        let t0 = DateTime::parse_from_rfc3339("2022-05-10T08:00:00Z").unwrap().timestamp_micros();
        assert_eq!(clip.span_us(), Some((t0 + 62_500_000, t0 + 72_250_000)));
        assert_eq!(clip.creation_label(2).as_deref(), Some("2022-05-10_100000"));
    }

    #[test]
    fn finds_overlapping_clips() {
        let meta = GoProMetadata::from_reader(META.as_bytes()).unwrap();
        let t0 = DateTime::parse_from_rfc3339("2022-05-10T08:00:00Z").unwrap().timestamp_micros();
        let hits: Vec<_> = meta.clips.iter().filter(|x| x.overlaps(t0 + 70_000_000, t0 + 75_000_000)).map(|x| x.file.as_str()).collect();
        assert_eq!(hits, ["GX010010_01.MP4"]);
        assert!(!meta.get("GX010010_02.MP4").unwrap().overlaps(t0, t0 + 1));
    }

    #[test]
    fn accepts_short_column_names() {
        let meta = GoProMetadata::from_reader("file,creation_time,start,end\na.MP4,bogus,0:00.000,0:01.000\n".as_bytes()).unwrap();
        assert_eq!(meta.clips[0].span_us(), None);
        assert!(!meta.clips[0].overlaps(i64::MIN, i64::MAX));
    }
}
