// SPDX-License-Identifier: MIT OR Apache-2.0

mod frames;
mod marks;

pub use frames::FrameTable;
pub use marks::Marks;

use std::io::*;
use std::path::{ Path, PathBuf };
use std::rc::Rc;

use crate::cache::MetadataCache;
use crate::util;

pub const RAW_FRAME_EXTENSION: &str = "pgm";

/// Everything the extraction step wrote next to the frames of one recording.
#[derive(Debug, Clone)]
pub struct RecordingMeta {
    pub file_meta: serde_yaml::Mapping,
    pub frames: FrameTable,
    pub marks: Option<Marks>,
}

impl RecordingMeta {
    pub fn metadata_path(dir: &Path) -> PathBuf { dir.join(format!("{}_metadata.yaml", util::folder_basename(dir))) }
    pub fn frames_path(dir: &Path)   -> PathBuf { dir.join(format!("{}_frames.csv",    util::folder_basename(dir))) }
    pub fn marks_path(dir: &Path)    -> PathBuf { dir.join(format!("{}_marks.yaml",    util::folder_basename(dir))) }

    /// File metadata and the frame table are required, marks are optional.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let file_meta = util::read_yaml::<serde_yaml::Mapping, _>(Self::metadata_path(dir))?;
        let frames = FrameTable::open(Self::frames_path(dir))?;
        let marks = Marks::load(Self::marks_path(dir));
        log::debug!("Loaded {} frames from {}", frames.len(), dir.display());
        Ok(Self { file_meta, frames, marks })
    }

    pub fn onset(&self) -> Option<usize> {
        self.marks.as_ref().and_then(Marks::onset)
    }
}

/// One ARIS acquisition, identified by its directory name.
#[derive(Debug, Clone)]
pub struct Recording {
    pub label: String,
    pub dir: PathBuf,
    pub meta: Rc<RecordingMeta>,
    pub frames_raw: Vec<PathBuf>,
    pub frames_polar: Option<Vec<PathBuf>>,
}

impl Recording {
    pub fn open<P: AsRef<Path>>(dir: P, polar_format: &str, cache: &mut MetadataCache) -> Result<Self> {
        let dir = dir.as_ref();
        let label = util::folder_basename(dir);
        let meta = cache.recording(dir)?;

        let frames_raw = util::list_sorted(dir, |p| util::has_extension(p, RAW_FRAME_EXTENSION))?;
        let frames_polar = match util::list_sorted(dir.join("polar"), |p| util::has_extension(p, polar_format)) {
            Ok(x) => Some(x),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("ARIS dataset {label} does not contain polar frames, using raw frames instead");
                None
            },
            Err(e) => return Err(e),
        };

        if frames_raw.len() != meta.frames.len() {
            return Err(util::invalid_data(format!("{label}: {} raw frames on disk, but {} rows in the frame table", frames_raw.len(), meta.frames.len())));
        }
        if let Some(polar) = frames_polar.as_ref().filter(|x| x.len() != meta.frames.len()) {
            return Err(util::invalid_data(format!("{label}: {} polar frames on disk, but {} rows in the frame table", polar.len(), meta.frames.len())));
        }

        Ok(Self { label, dir: dir.to_path_buf(), meta, frames_raw, frames_polar })
    }

    pub fn frames(&self) -> &FrameTable { &self.meta.frames }
    pub fn frame_count(&self) -> usize { self.meta.frames.len() }
    pub fn onset(&self) -> Option<usize> { self.meta.onset() }

    /// Writes `onset` to the marks file, keeping the marks already there.
    /// Cached metadata keeps the previous onset until it is reloaded.
    pub fn save_onset(&self, onset: usize) -> Result<()> {
        if onset >= self.frame_count() {
            return Err(Error::new(ErrorKind::InvalidInput, format!("{}: onset {onset} is past the last frame", self.label)));
        }
        let path = RecordingMeta::marks_path(&self.dir);
        let marks = Marks::load(&path).map(|x| x.marks).unwrap_or_default();
        Marks::new(Some(onset), marks).save(&path)?;
        log::info!("{}: saved onset {onset}", self.label);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Writes a recording directory with `count` frames spaced `period_us` apart, starting at `t0`.
    pub fn write_recording(root: &Path, name: &str, count: usize, t0: i64, period_us: i64, onset: Option<usize>) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join("polar")).unwrap();
        std::fs::write(dir.join(format!("{name}_metadata.yaml")), "Version: 88491076\nFrameCount: 3\n").unwrap();

        let rate = 1e6 / period_us as f64;
        let mut csv = String::from("FrameIndex,FrameTime,FrameRate\n");
        for i in 0..count {
            csv.push_str(&format!("{i},{},{rate}\n", t0 + i as i64 * period_us));
            std::fs::write(dir.join(format!("{i:04}.pgm")), format!("raw {i}")).unwrap();
            std::fs::write(dir.join("polar").join(format!("{i:04}.png")), format!("polar {i}")).unwrap();
        }
        std::fs::write(dir.join(format!("{name}_frames.csv")), csv).unwrap();

        if onset.is_some() {
            Marks::new(onset, vec![]).save(dir.join(format!("{name}_marks.yaml"))).unwrap();
        }
        dir
    }

    #[test]
    fn opens_recording_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_recording(root.path(), "2022-05-10_101010", 12, 0, 100_000, Some(4));
        let mut cache = MetadataCache::new();

        let rec = Recording::open(&dir, "png", &mut cache).unwrap();
        assert_eq!(rec.label, "2022-05-10_101010");
        assert_eq!(rec.frame_count(), 12);
        assert_eq!(rec.frames_raw.len(), 12);
        assert_eq!(rec.frames_polar.as_ref().map(Vec::len), Some(12));
        assert_eq!(rec.onset(), Some(4));
        assert!(rec.frames_polar.as_ref().unwrap()[11].ends_with("polar/0011.png"));
        assert_eq!(rec.meta.file_meta.get("FrameCount").and_then(|v| v.as_i64()), Some(3));
    }

    #[test]
    fn missing_polar_frames_fall_back_to_raw() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_recording(root.path(), "rec", 3, 0, 10, None);
        std::fs::remove_dir_all(dir.join("polar")).unwrap();

        let rec = Recording::open(&dir, "png", &mut MetadataCache::new()).unwrap();
        assert!(rec.frames_polar.is_none());
        assert!(rec.frames_raw[1].ends_with("0001.pgm"));
        assert_eq!(rec.onset(), None);
    }

    #[test]
    fn missing_frame_table_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_recording(root.path(), "rec", 3, 0, 10, None);
        std::fs::remove_file(dir.join("rec_frames.csv")).unwrap();

        let err = Recording::open(&dir, "png", &mut MetadataCache::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn raw_frame_count_must_match_the_table() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_recording(root.path(), "rec", 5, 0, 10, None);
        std::fs::remove_file(dir.join("0004.pgm")).unwrap();

        let err = Recording::open(&dir, "png", &mut MetadataCache::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(err.to_string().contains("4 raw frames"));
    }

    #[test]
    fn polar_frame_count_must_match_the_table() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_recording(root.path(), "rec", 5, 0, 10, None);
        std::fs::write(dir.join("polar").join("0005.png"), "polar 5").unwrap();

        let err = Recording::open(&dir, "png", &mut MetadataCache::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(err.to_string().contains("6 polar frames"));

        // Other formats in the polar directory do not count
        std::fs::remove_file(dir.join("polar").join("0005.png")).unwrap();
        std::fs::write(dir.join("polar").join("preview.jpg"), "").unwrap();
        assert!(Recording::open(&dir, "png", &mut MetadataCache::new()).is_ok());
    }

    #[test]
    fn saving_the_onset_keeps_marks() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_recording(root.path(), "rec", 8, 0, 10, None);
        let rec = Recording::open(&dir, "png", &mut MetadataCache::new()).unwrap();

        rec.save_onset(3).unwrap();
        assert_eq!(Recording::open(&dir, "png", &mut MetadataCache::new()).unwrap().onset(), Some(3));

        Marks::new(Some(3), vec![6, 1]).save(RecordingMeta::marks_path(&dir)).unwrap();
        rec.save_onset(5).unwrap();
        let marks = Marks::load(RecordingMeta::marks_path(&dir)).unwrap();
        assert_eq!((marks.onset(), marks.marks), (Some(5), vec![1, 6]));

        assert_eq!(rec.save_onset(8).unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
