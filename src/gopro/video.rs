// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::*;
use std::path::Path;

use opencv::{ core::{ Mat, Vector }, imgcodecs, prelude::*, videoio::{ self, CAP_ANY, VideoCapture } };

use super::{ Frame, FrameSource, Mp4Clip };

fn cv_error(e: opencv::Error) -> Error {
    Error::new(ErrorKind::Other, e)
}

/// Video file decoded with OpenCV, every frame encoded to an image format.
///
/// Frame count and rate come from the container index when it parses, so they agree with
/// [`Mp4Clip`]. Seeks go through `CAP_PROP_POS_FRAMES` and report where the decoder landed.
pub struct VideoClip {
    capture: VideoCapture,
    frame_count: i64,
    fps: f64,
    format: String,
    position: i64,
}

impl VideoClip {
    pub fn open<P: AsRef<Path>>(path: P, format: &str) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_str().ok_or_else(|| Error::new(ErrorKind::InvalidInput, format!("{}: not a UTF-8 path", path.display())))?;

        let capture = VideoCapture::from_file(name, CAP_ANY).map_err(cv_error)?;
        if !capture.is_opened().map_err(cv_error)? {
            return Err(Error::new(ErrorKind::InvalidData, format!("{}: cannot open video", path.display())));
        }

        let (frame_count, fps) = match Mp4Clip::open(path) {
            Ok(index) => (index.frame_count(), index.fps()),
            Err(e) => {
                log::warn!("{}: container index unavailable ({e}), using the decoder's frame count", path.display());
                let count = capture.get(videoio::CAP_PROP_FRAME_COUNT).map_err(cv_error)?;
                let fps = capture.get(videoio::CAP_PROP_FPS).map_err(cv_error)?;
                if count < 1.0 || fps <= 0.0 {
                    return Err(Error::new(ErrorKind::InvalidData, format!("{}: unknown frame count or rate", path.display())));
                }
                (count as i64, fps)
            }
        };

        Ok(Self { capture, frame_count, fps, format: format.trim_start_matches('.').to_owned(), position: 0 })
    }
}

impl FrameSource for VideoClip {
    fn frame_count(&self) -> i64 { self.frame_count }
    fn fps(&self) -> f64 { self.fps }

    fn seek(&mut self, index: i64) -> Result<i64> {
        if index < 0 || index >= self.frame_count {
            return Err(Error::new(ErrorKind::InvalidInput, format!("frame {index} out of range 0..{}", self.frame_count)));
        }
        if index == self.position {
            return Ok(index);
        }
        self.capture.set(videoio::CAP_PROP_POS_FRAMES, index as f64).map_err(cv_error)?;
        let landed = self.capture.get(videoio::CAP_PROP_POS_FRAMES).map_err(cv_error)?;
        self.position = (landed.round() as i64).clamp(0, index);
        Ok(self.position)
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let mut image = Mat::default();
        if !self.capture.read(&mut image).map_err(cv_error)? || image.empty() {
            return Ok(None);
        }
        let mut data = Vector::<u8>::new();
        if !imgcodecs::imencode(&format!(".{}", self.format), &image, &mut data, &Vector::new()).map_err(cv_error)? {
            return Err(Error::new(ErrorKind::InvalidData, format!("cannot encode frame {} as {}", self.position, self.format)));
        }
        let index = self.position;
        self.position += 1;
        Ok(Some(Frame { index, data: data.to_vec() }))
    }

    fn grab(&mut self) -> Result<bool> {
        if !self.capture.grab().map_err(cv_error)? {
            return Ok(false);
        }
        self.position += 1;
        Ok(true)
    }

    fn extension(&self) -> &str { &self.format }
}
