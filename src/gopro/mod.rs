// SPDX-License-Identifier: MIT OR Apache-2.0

mod metadata;
mod mp4;
mod sequence;
#[cfg(feature = "video")]
mod video;

pub use metadata::{ GoProMetadata, GoProClipInfo };
pub use mp4::Mp4Clip;
pub use sequence::ImageSequence;
#[cfg(feature = "video")]
pub use video::VideoClip;

use std::io::*;
use std::path::{ Path, PathBuf };

use crate::util;

/// One frame, encoded as an image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: i64,
    pub data: Vec<u8>,
}

/// Random access to the frames of a clip.
pub trait FrameSource {
    fn frame_count(&self) -> i64;
    fn fps(&self) -> f64;

    /// Positions the source at `index` and returns the index it actually landed on.
    /// Sources that can only seek to keyframes land before the requested index.
    fn seek(&mut self, index: i64) -> Result<i64>;

    /// Reads the frame at the current position and advances. `None` past the end.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Advances one frame without returning it. `false` past the end.
    fn grab(&mut self) -> Result<bool> {
        Ok(self.read()?.is_some())
    }

    /// Whether frames can be decoded into images. Sources that only index a container
    /// still provide timing, so clips can be aligned without a decoder.
    fn decodes(&self) -> bool { true }

    /// File extension of the frame data.
    fn extension(&self) -> &str;
}

/// Seeks to `index` and decodes forward from wherever the source landed.
/// Returns the position reached, which is short of `index` only for sources that cannot decode.
pub fn seek_exact(source: &mut dyn FrameSource, index: i64) -> Result<i64> {
    let mut position = source.seek(index)?;
    if !source.decodes() {
        return Ok(position);
    }
    while position < index {
        if !source.grab()? { break; }
        position += 1;
    }
    Ok(position)
}

#[derive(Debug, Clone)]
pub struct ClipOptions {
    /// Frame rate of image sequences, which do not carry one.
    pub fps: Option<f64>,
    /// Extension of the images in a sequence directory.
    pub sequence_format: String,
    /// Image format decoded video frames are encoded to.
    pub output_format: String,
}

impl Default for ClipOptions {
    fn default() -> Self {
        Self { fps: None, sequence_format: "jpg".into(), output_format: "jpg".into() }
    }
}

pub struct GoProClip {
    pub label: String,
    pub path: PathBuf,
    source: Box<dyn FrameSource>,
}

impl GoProClip {
    /// Directories are read as image sequences, anything else as a video file.
    pub fn open<P: AsRef<Path>>(path: P, options: &ClipOptions) -> Result<Self> {
        let path = path.as_ref();
        let source: Box<dyn FrameSource> = if path.is_dir() {
            let fps = options.fps.ok_or_else(|| Error::new(ErrorKind::InvalidInput, format!("{}: image sequences need a frame rate", path.display())))?;
            Box::new(ImageSequence::open(path, fps, &options.sequence_format)?)
        } else {
            Self::open_video(path, options)?
        };
        log::debug!("{}: {} frames at {:.3} fps", path.display(), source.frame_count(), source.fps());
        Ok(Self { label: util::folder_basename(path), path: path.to_path_buf(), source })
    }

    #[cfg(feature = "video")]
    fn open_video(path: &Path, options: &ClipOptions) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(VideoClip::open(path, &options.output_format)?))
    }

    #[cfg(not(feature = "video"))]
    fn open_video(path: &Path, _options: &ClipOptions) -> Result<Box<dyn FrameSource>> {
        log::info!("{}: built without the `video` feature, frames can be aligned but not decoded", path.display());
        Ok(Box::new(Mp4Clip::open(path)?))
    }

    pub fn from_source(label: &str, source: Box<dyn FrameSource>) -> Self {
        Self { label: label.to_owned(), path: PathBuf::from(label), source }
    }

    pub fn frame_count(&self) -> i64 { self.source.frame_count() }
    pub fn fps(&self) -> f64 { self.source.fps() }
    pub fn decodes(&self) -> bool { self.source.decodes() }
    pub fn extension(&self) -> &str { self.source.extension() }
    pub fn source_mut(&mut self) -> &mut dyn FrameSource { self.source.as_mut() }
}

/// Orders GoPro file names (`GXccvvvv_kk.MP4`: chapter, video number, clip) by chapter,
/// then video, then clip. Anything before the `GX` prefix is ignored.
pub fn gopro_sorting_key<P: AsRef<Path>>(path: P) -> String {
    let stem = util::file_stem(path);
    let base = stem.find("GX").map(|p| &stem[p..]).unwrap_or(&stem);
    let part = |a: usize, b: usize| base.get(a..b.min(base.len())).unwrap_or("");
    format!("{}{}{}", part(2, 4), part(4, 8), part(9, 11))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// In-memory clip with keyframes every `gop` frames that counts its seeks.
    pub struct FakeClip {
        pub frames: i64,
        pub fps: f64,
        pub gop: i64,
        pub position: i64,
        pub seeks: Rc<Cell<usize>>,
        pub broken: Vec<i64>,
        pub decodes: bool,
    }

    impl FakeClip {
        pub fn new(frames: i64, fps: f64, gop: i64) -> (Self, Rc<Cell<usize>>) {
            let seeks = Rc::new(Cell::new(0));
            (Self { frames, fps, gop, position: 0, seeks: seeks.clone(), broken: Vec::new(), decodes: true }, seeks)
        }
    }

    impl FrameSource for FakeClip {
        fn frame_count(&self) -> i64 { self.frames }
        fn fps(&self) -> f64 { self.fps }
        fn seek(&mut self, index: i64) -> Result<i64> {
            self.seeks.set(self.seeks.get() + 1);
            self.position = index - index % self.gop;
            Ok(self.position)
        }
        fn read(&mut self) -> Result<Option<Frame>> {
            if self.broken.contains(&self.position) {
                return Err(Error::new(ErrorKind::InvalidData, "corrupt frame"));
            }
            if self.position >= self.frames { return Ok(None); }
            let f = Frame { index: self.position, data: self.position.to_le_bytes().to_vec() };
            self.position += 1;
            Ok(Some(f))
        }
        fn decodes(&self) -> bool { self.decodes }
        fn extension(&self) -> &str { "raw" }
    }

    #[test]
    fn sorts_by_chapter_video_clip() {
        let mut files = vec!["GX020011_01.MP4", "GX010012_02.MP4", "GX010012_01.MP4", "day2_GX010011_03.MP4"];
        files.sort_by_key(|f| gopro_sorting_key(f));
        assert_eq!(files, ["day2_GX010011_03.MP4", "GX010012_01.MP4", "GX010012_02.MP4", "GX020011_01.MP4"]);
        assert_eq!(gopro_sorting_key("GX01"), "01");
    }

    #[test]
    fn exact_seeks_decode_forward_from_the_keyframe() {
        let (mut clip, seeks) = FakeClip::new(100, 30.0, 15);
        assert_eq!(seek_exact(&mut clip, 22).unwrap(), 22);
        assert_eq!(clip.read().unwrap().unwrap().index, 22);
        assert_eq!(seeks.get(), 1);

        assert_eq!(seek_exact(&mut clip, 30).unwrap(), 30);
        assert_eq!(seek_exact(&mut clip, 99).unwrap(), 99);
        assert_eq!(clip.read().unwrap().unwrap().index, 99);
        assert!(clip.read().unwrap().is_none());
    }

    #[test]
    fn exact_seeks_stop_at_the_keyframe_without_a_decoder() {
        let (mut clip, _) = FakeClip::new(100, 30.0, 15);
        clip.decodes = false;
        assert_eq!(seek_exact(&mut clip, 22).unwrap(), 15);
    }

    #[test]
    fn broken_frames_interrupt_exact_seeks() {
        let (mut clip, _) = FakeClip::new(100, 30.0, 15);
        clip.broken.push(18);
        assert_eq!(seek_exact(&mut clip, 22).unwrap_err().kind(), ErrorKind::InvalidData);
        assert_eq!(seek_exact(&mut clip, 17).unwrap(), 17);
    }

    #[test]
    fn image_sequence_requires_fps() {
        let dir = tempfile::tempdir().unwrap();
        let err = GoProClip::open(dir.path(), &ClipOptions::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
