// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs::File;
use std::io::*;
use std::path::Path;
use byteorder::{ ReadBytesExt, BigEndian };

use super::{ Frame, FrameSource };

/// Video track of an MP4 container, indexed without decoding.
///
/// Only timing and the keyframe layout are known: frame `i` is the `i`-th displayed frame
/// and seeking lands on the closest sync sample at or before it. Decoding needs `VideoClip`.
pub struct Mp4Clip {
    sync: Vec<bool>,
    fps: f64,
    position: usize,
}

impl Mp4Clip {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = BufReader::new(File::open(path)?);
        let size = file.get_ref().metadata()?.len() as usize;

        let ctx = parse_structure(&mut file, size)?;
        let track = ctx.tracks.iter().find(|x| x.track_type == mp4parse::TrackType::Video)
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("{}: no video track", path.display())))?;

        let table = mp4parse::unstable::create_sample_table(track, 0.into())
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("{}: unreadable sample table", path.display())))?;

        // Presentation order
        let mut ordered: Vec<_> = table.into_iter().map(|x| (x.start_composition.0, x.sync)).collect();
        ordered.sort_by_key(|x| x.0);
        let sync: Vec<bool> = ordered.into_iter().map(|x| x.1).collect();

        let fps = track_fps(track, sync.len())
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("{}: unknown frame rate", path.display())))?;

        Ok(Self::from_sync(sync, fps))
    }

    fn from_sync(sync: Vec<bool>, fps: f64) -> Self {
        Self { sync, fps, position: 0 }
    }
}

impl FrameSource for Mp4Clip {
    fn frame_count(&self) -> i64 { self.sync.len() as i64 }
    fn fps(&self) -> f64 { self.fps }

    fn seek(&mut self, index: i64) -> Result<i64> {
        if index < 0 || index >= self.frame_count() {
            return Err(Error::new(ErrorKind::InvalidInput, format!("frame {index} out of range 0..{}", self.sync.len())));
        }
        let landed = self.sync[..=index as usize].iter().rposition(|x| *x).unwrap_or(0);
        self.position = landed;
        Ok(landed as i64)
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self.position >= self.sync.len() { return Ok(None); }
        Err(Error::new(ErrorKind::Unsupported, "decoding video needs the `video` feature"))
    }

    fn grab(&mut self) -> Result<bool> {
        if self.position >= self.sync.len() { return Ok(false); }
        self.position += 1;
        Ok(true)
    }

    fn decodes(&self) -> bool { false }

    fn extension(&self) -> &str { "" }
}

/// Frames per second from the track duration and its sample count.
fn track_fps(track: &mp4parse::Track, sample_count: usize) -> Option<f64> {
    let timescale = track.timescale?.0 as f64;
    let duration = track.duration?.0 as f64;
    if sample_count == 0 || timescale <= 0.0 || duration <= 0.0 { return None; }

    let us_per_frame = duration * 1_000_000.0 / timescale / sample_count as f64;
    Some(1_000_000.0 / us_per_frame)
}

const HEAD_TAIL_SIZE: usize = 2 * 1024 * 1024;

/// Parses the box structure. Large files are parsed from their first and last
/// `HEAD_TAIL_SIZE` bytes with the `mdat` length patched to match, and fully when that fails.
fn parse_structure<T: Read + Seek>(stream: &mut T, size: usize) -> Result<mp4parse::MediaContext> {
    if size > HEAD_TAIL_SIZE * 5 {
        let mut buf = read_head_and_tail(stream, size)?;
        let skipped = (size - buf.len()) as u64;
        if patch_mdat_size(&mut buf, skipped).is_some() {
            match mp4parse::read_mp4(&mut Cursor::new(&buf)) {
                Ok(ctx) => return Ok(ctx),
                Err(e) => log::debug!("Partial MP4 parse failed ({e:?}), reading the whole file"),
            }
        }
    }
    stream.seek(SeekFrom::Start(0))?;
    Ok(mp4parse::read_mp4(stream)?)
}

fn read_head_and_tail<T: Read + Seek>(stream: &mut T, size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; HEAD_TAIL_SIZE * 2];
    stream.seek(SeekFrom::Start(0))?;
    stream.read_exact(&mut buf[..HEAD_TAIL_SIZE])?;
    stream.seek(SeekFrom::Start((size - HEAD_TAIL_SIZE) as u64))?;
    stream.read_exact(&mut buf[HEAD_TAIL_SIZE..])?;
    stream.seek(SeekFrom::Start(0))?;
    Ok(buf)
}

/// Shrinks the first `mdat` box by `skipped` bytes, handling 64-bit box sizes.
fn patch_mdat_size(buf: &mut [u8], skipped: u64) -> Option<()> {
    let pos = memchr::memmem::find(buf, b"mdat")?;
    if pos < 4 || buf.len() < pos + 12 { return None; }

    let len = (&buf[pos - 4..]).read_u32::<BigEndian>().ok()? as u64;
    if len == 1 {
        let large = (&buf[pos + 4..]).read_u64::<BigEndian>().ok()?.checked_sub(skipped)?;
        buf[pos + 4..pos + 12].copy_from_slice(&large.to_be_bytes());
    } else {
        let len = len.checked_sub(skipped)?;
        buf[pos - 4..pos].copy_from_slice(&(len as u32).to_be_bytes());
    }
    Some(())
}
