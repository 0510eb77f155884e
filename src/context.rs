// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::*;
use std::rc::Rc;
use serde::Serialize;

use crate::aris::Recording;
use crate::association::Association;
use crate::flow::FlowSignal;
use crate::gantry::GantrySession;
use crate::gopro::{ self, Frame, GoProClip };
use crate::util;

/// The curated `[start, end]` window of a recording, both ends inclusive.
/// Always satisfies `start < end <= frame_count - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveRange {
    start: usize,
    end: usize,
    frame_count: usize,
}

impl ActiveRange {
    pub fn new(start: usize, end: usize, frame_count: usize) -> Result<Self> {
        if start >= end || end >= frame_count {
            return Err(Error::new(ErrorKind::InvalidInput, format!("invalid active range [{start}, {end}] for {frame_count} frames")));
        }
        Ok(Self { start, end, frame_count })
    }

    pub fn full(frame_count: usize) -> Result<Self> {
        Self::new(0, frame_count.saturating_sub(1), frame_count)
    }

    /// Moves the start, keeping it below the end.
    pub fn with_start(self, start: usize) -> Self {
        Self { start: start.min(self.end - 1), ..self }
    }

    /// Moves the end, keeping it above the start and inside the recording.
    pub fn with_end(self, end: usize) -> Self {
        Self { end: end.max(self.start + 1).min(self.frame_count - 1), ..self }
    }

    pub fn start(&self) -> usize { self.start }
    pub fn end(&self) -> usize { self.end }
    pub fn frame_count(&self) -> usize { self.frame_count }
    pub fn len(&self) -> usize { self.end - self.start + 1 }
    pub fn is_empty(&self) -> bool { false }
    pub fn contains(&self, position: usize) -> bool { position >= self.start && position <= self.end }
    pub fn positions(&self) -> std::ops::RangeInclusive<usize> { self.start..=self.end }
}

/// Single slot cache of the last GoPro read.
#[derive(Debug, Clone)]
pub struct LastDecodedFrame {
    /// Requested frame index.
    pub index: i64,
    /// Index the clip actually landed on.
    pub position: i64,
    /// `None` when the read failed or ran past the end.
    pub frame: Option<Frame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoProLookup<'a> {
    pub requested: i64,
    /// Where the clip landed, `None` if no seek was possible.
    pub position: Option<i64>,
    pub frame: Option<&'a Frame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GantryOdom {
    pub position: [f64; 3],
    /// Timestamp used for the interpolation, after clamping into the session.
    pub timestamp_us: i64,
    pub target_us: i64,
}

impl GantryOdom {
    pub fn is_clamped(&self) -> bool { self.timestamp_us != self.target_us }
}

/// Time since the start of the active range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Elapsed {
    pub s: i64,
    pub ms: i64,
    pub us: i64,
}

impl Elapsed {
    pub fn from_micros(us: i64) -> Self {
        let (s, ms, us) = util::split_microseconds(us);
        Self { s, ms, us }
    }
}

/// Where every stream is at one ARIS frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alignment {
    pub aris_frame: usize,
    pub aris_time_us: i64,
    pub elapsed: Elapsed,
    pub gopro_index: Option<i64>,
    pub gantry: Option<GantryOdom>,
    /// Normalized optical flow of the recording at this frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aris_flow: Option<f64>,
    /// Normalized optical flow of the clip at `gopro_index`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gopro_flow: Option<f64>,
}

/// Maps positions on a recording's frame timeline onto a GoPro clip and a gantry session.
///
/// Every lookup is relative to the frame time of the active range's start, so moving the
/// start or changing an offset changes all following lookups.
pub struct MatchingContext {
    recording: Recording,
    gantry: Option<GantrySession>,
    gopro: Option<GoProClip>,
    range: ActiveRange,
    cursor: usize,
    tick_step: usize,
    gopro_offset: i64,
    gantry_offset_us: i64,
    last_gopro: Option<LastDecodedFrame>,
    aris_flow: Option<Rc<FlowSignal>>,
    gopro_flow: Option<Rc<FlowSignal>>,
}

impl MatchingContext {
    /// Starts at the recording's saved onset (if any), with the gantry offset lining
    /// gantry motion onset up with it.
    pub fn new(recording: Recording, gantry: Option<GantrySession>, gopro: Option<GoProClip>) -> Result<Self> {
        let mut range = ActiveRange::full(recording.frame_count())
            .map_err(|e| Error::new(e.kind(), format!("{}: {e}", recording.label)))?;
        if let Some(onset) = recording.onset() {
            range = range.with_start(onset);
            if range.start() != onset {
                log::warn!("{}: onset {onset} is past the last frame, starting at {}", recording.label, range.start());
            }
        }
        let gantry_offset_us = gantry.as_ref().map(|x| x.summary.default_offset_us()).unwrap_or(0);

        Ok(Self {
            recording,
            gantry,
            gopro,
            cursor: range.start(),
            range,
            tick_step: 1,
            gopro_offset: 0,
            gantry_offset_us,
            last_gopro: None,
            aris_flow: None,
            gopro_flow: None,
        })
    }

    pub fn recording(&self) -> &Recording { &self.recording }
    pub fn gantry(&self) -> Option<&GantrySession> { self.gantry.as_ref() }
    pub fn gopro(&self) -> Option<&GoProClip> { self.gopro.as_ref() }
    pub fn has_gopro(&self) -> bool { self.gopro.is_some() }
    pub fn has_gantry(&self) -> bool { self.gantry.is_some() }

    pub fn range(&self) -> ActiveRange { self.range }
    pub fn start_frame(&self) -> usize { self.range.start() }
    pub fn end_frame(&self) -> usize { self.range.end() }
    pub fn active_frames(&self) -> usize { self.range.len() }

    pub fn active_duration_us(&self) -> i64 {
        let t = self.recording.frames().times();
        t[self.range.end()] - t[self.range.start()]
    }

    pub fn set_range(&mut self, start: usize, end: usize) -> Result<()> {
        self.range = ActiveRange::new(start, end, self.recording.frame_count())?;
        self.cursor = self.cursor.clamp(start, end);
        Ok(())
    }

    /// Returns the start actually used, which stays below the end.
    pub fn set_start(&mut self, start: usize) -> usize {
        self.range = self.range.with_start(start);
        self.cursor = self.cursor.max(self.range.start());
        self.range.start()
    }

    pub fn set_end(&mut self, end: usize) -> usize {
        self.range = self.range.with_end(end);
        self.cursor = self.cursor.min(self.range.end());
        self.range.end()
    }

    pub fn cursor(&self) -> usize { self.cursor }

    /// Positions outside of the active range restart at its start.
    pub fn set_cursor(&mut self, position: usize) {
        self.cursor = if self.range.contains(position) { position } else { self.range.start() };
    }

    pub fn tick_step(&self) -> usize { self.tick_step }
    pub fn set_tick_step(&mut self, step: usize) { self.tick_step = step.max(1); }

    /// Advances playback by the tick step, looping back to the start of the range.
    pub fn tick(&mut self) -> usize {
        self.set_cursor(self.cursor + self.tick_step);
        self.cursor
    }

    /// Flow signals reported by [`Self::align`]. The GoPro one is indexed by clip frame.
    pub fn set_flows(&mut self, aris: Option<Rc<FlowSignal>>, gopro: Option<Rc<FlowSignal>>) {
        self.aris_flow = aris;
        self.gopro_flow = gopro;
    }

    pub fn gopro_offset(&self) -> i64 { self.gopro_offset }
    pub fn set_gopro_offset(&mut self, offset: i64) { self.gopro_offset = offset; }
    pub fn gantry_offset_us(&self) -> i64 { self.gantry_offset_us }
    pub fn set_gantry_offset_us(&mut self, offset: i64) { self.gantry_offset_us = offset; }

    /// Capture time of a frame. Negative positions are not representable, the last
    /// frame is `frames().last_time()`.
    pub fn aris_frametime(&self, position: usize) -> Option<i64> {
        self.recording.frames().time_at(position)
    }

    /// Like [`Self::aris_frametime`], but continues the timeline linearly with the mean
    /// frame period beyond both ends. Only meant for display windows around the cursor.
    pub fn aris_frametime_extrapolated(&self, index: i64) -> i64 {
        let frames = self.recording.frames();
        let last = frames.len() as i64 - 1;
        if index < 0 {
            frames.first_time() - (index.unsigned_abs() as f64 * frames.mean_period_us()).round() as i64
        } else if index > last {
            frames.last_time() + ((index - last) as f64 * frames.mean_period_us()).round() as i64
        } else {
            frames.times()[index as usize]
        }
    }

    fn start_time(&self) -> i64 {
        self.recording.frames().times()[self.range.start()]
    }

    /// GoPro frame index shown at `aris_time_us`, `None` without a clip.
    pub fn aristime_to_gopro_index(&self, aris_time_us: i64) -> Option<i64> {
        let fps = self.gopro.as_ref()?.fps();
        let delta = aris_time_us.saturating_sub(self.start_time());
        Some(((delta as f64 / 1e6 * fps).floor() as i64).saturating_add(self.gopro_offset))
    }

    /// Reads the GoPro frame for `aris_time_us`.
    ///
    /// With `exact`, the clip decodes forward from the keyframe it seeks to. A clip that
    /// cannot decode lands on the keyframe and gives no frame.
    /// The last read is kept, asking for the same index again does not touch the clip.
    /// Read failures are logged and give no frame.
    pub fn gopro_frame(&mut self, aris_time_us: i64, exact: bool) -> GoProLookup<'_> {
        let Some(requested) = self.aristime_to_gopro_index(aris_time_us) else {
            return GoProLookup { requested: 0, position: None, frame: None };
        };

        let cached = self.last_gopro.as_ref().is_some_and(|x| x.index == requested && (!exact || x.position == requested));
        if !cached {
            let Some(clip) = self.gopro.as_mut() else {
                return GoProLookup { requested, position: None, frame: None };
            };
            if requested < 0 || requested >= clip.frame_count() {
                log::trace!("GoPro frame {requested} is outside of {}", clip.label);
                return GoProLookup { requested, position: None, frame: None };
            }

            let label = clip.label.clone();
            let source = clip.source_mut();
            let landed = if exact { gopro::seek_exact(source, requested) } else { source.seek(requested) };
            let position = match landed {
                Ok(x) => x,
                Err(e) => {
                    log::warn!("Seeking {label} to frame {requested} failed: {e}");
                    return GoProLookup { requested, position: None, frame: None };
                }
            };
            if exact && position != requested {
                log::debug!("{label}: seek to {requested} landed on {position}");
                return GoProLookup { requested, position: Some(position), frame: None };
            }

            let frame = match source.read() {
                Ok(x) => x,
                Err(e) => {
                    log::warn!("Reading frame {position} of {label} failed: {e}");
                    None
                }
            };
            self.last_gopro = Some(LastDecodedFrame { index: requested, position, frame });
        }

        match self.last_gopro.as_ref() {
            Some(last) => GoProLookup { requested, position: Some(last.position), frame: last.frame.as_ref() },
            None => GoProLookup { requested, position: None, frame: None },
        }
    }

    pub fn last_decoded(&self) -> Option<&LastDecodedFrame> { self.last_gopro.as_ref() }

    /// Gantry position at `aris_time_us`. Targets outside of the session hold its first
    /// or last sample.
    pub fn gantry_odom(&self, aris_time_us: i64) -> Option<GantryOdom> {
        let gantry = self.gantry.as_ref()?;
        let target_us = gantry.start_us()
            .saturating_add(self.gantry_offset_us)
            .saturating_add(aris_time_us.saturating_sub(self.start_time()));
        let (position, timestamp_us) = gantry.odom_at(target_us);
        Some(GantryOdom { position, timestamp_us, target_us })
    }

    /// Bounds for the GoPro offset: shifting further back than the recording is long leaves
    /// nothing to match, shifting further forward than the clip is long does the same.
    pub fn usable_gopro_range(&self) -> Option<(i64, i64)> {
        let clip = self.gopro.as_ref()?;
        let duration_s = self.recording.frames().duration_us() as f64 / 1e6;
        Some((-(duration_s * clip.fps()).floor() as i64, clip.frame_count()))
    }

    /// Derives the gantry offset from the GoPro offset, for recordings where both were
    /// started together. Returns the new gantry offset.
    pub fn couple_gantry_to_gopro(&mut self) -> Option<i64> {
        let (min, max) = self.usable_gopro_range()?;
        let fps = self.gopro.as_ref()?.fps();
        let summary = self.gantry.as_ref()?.summary;

        let shift_us = (self.gopro_offset.clamp(min, max) as f64 / fps * 1e6).round() as i64;
        self.gantry_offset_us = summary.default_offset_us().saturating_add(shift_us);
        Some(self.gantry_offset_us)
    }

    pub fn align(&self, position: usize) -> Option<Alignment> {
        let aris_time_us = self.aris_frametime(position)?;
        let gopro_index = self.aristime_to_gopro_index(aris_time_us);
        Some(Alignment {
            aris_frame: position,
            aris_time_us,
            elapsed: Elapsed::from_micros(aris_time_us - self.start_time()),
            gopro_index,
            gantry: self.gantry_odom(aris_time_us),
            aris_flow: self.aris_flow.as_ref().and_then(|x| x.at(position as i64)),
            gopro_flow: gopro_index.zip(self.gopro_flow.as_ref()).and_then(|(i, x)| x.at(i)),
        })
    }

    /// Restores start frame and offsets from a saved association.
    pub fn apply(&mut self, association: &Association) {
        self.set_start(association.aris_onset.max(0) as usize);
        self.gopro_offset = association.gopro_offset;
        self.gantry_offset_us = association.gantry_offset;
    }

    pub fn to_association(&self, aris_idx: usize, gopro_idx: Option<usize>, gantry_idx: Option<usize>, notes: &str) -> Association {
        Association {
            aris_idx: aris_idx as i64,
            gopro_idx: gopro_idx.map(|x| x as i64).unwrap_or(-1),
            gantry_idx: gantry_idx.map(|x| x as i64).unwrap_or(-1),
            aris_onset: self.range.start() as i64,
            gopro_offset: self.gopro_offset,
            gantry_offset: self.gantry_offset_us,
            notes: notes.to_owned(),
            ..Default::default()
        }
    }
}
