// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::*;
use std::path::{ Path, PathBuf };

use super::{ Frame, FrameSource };
use crate::util;

/// A directory of already extracted frames, one image per frame in natural file order.
/// Every frame is addressable, so seeks are exact.
pub struct ImageSequence {
    files: Vec<PathBuf>,
    fps: f64,
    extension: String,
    position: usize,
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(dir: P, fps: f64, extension: &str) -> Result<Self> {
        if !(fps > 0.0) {
            return Err(Error::new(ErrorKind::InvalidInput, format!("invalid frame rate {fps}")));
        }
        let files = util::list_sorted(dir.as_ref(), |x| util::has_extension(x, extension))?;
        if files.is_empty() {
            log::warn!("{}: no *.{extension} frames", dir.as_ref().display());
        }
        Ok(Self { files, fps, extension: extension.to_owned(), position: 0 })
    }

    pub fn path(&self, index: usize) -> Option<&Path> { self.files.get(index).map(|x| x.as_path()) }
}

impl FrameSource for ImageSequence {
    fn frame_count(&self) -> i64 { self.files.len() as i64 }
    fn fps(&self) -> f64 { self.fps }

    fn seek(&mut self, index: i64) -> Result<i64> {
        if index < 0 || index >= self.frame_count() {
            return Err(Error::new(ErrorKind::InvalidInput, format!("frame {index} out of range 0..{}", self.files.len())));
        }
        self.position = index as usize;
        Ok(index)
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.position) else { return Ok(None); };
        let data = std::fs::read(path)?;
        let index = self.position as i64;
        self.position += 1;
        Ok(Some(Frame { index, data }))
    }

    fn extension(&self) -> &str { &self.extension }
}
