// SPDX-License-Identifier: MIT OR Apache-2.0

mod index;

pub use index::{ GantryIndex, GantryIndexEntry };

use std::io::*;
use std::path::{ Path, PathBuf };
use serde::{ Serialize, Deserialize };

use crate::cache::MetadataCache;
use crate::util;

/// How the start of motion is located in a trajectory log.
///
/// Motion is the first sample whose x or y differs from the sample right before it (z alone
/// does not count). The dataset has been processed with both variants below, they are one
/// sample period apart, so the choice is kept explicit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnsetPolicy {
    /// Timestamp of the first sample that moved.
    #[default]
    FirstChange,
    /// Timestamp of the last sample before the first one that moved.
    LastStationary,
}

impl std::str::FromStr for OnsetPolicy {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "first_change"    | "first-change"    => Ok(Self::FirstChange),
            "last_stationary" | "last-stationary" => Ok(Self::LastStationary),
            _ => Err(format!("unknown onset policy: {s}"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GantrySummary {
    pub start_us: i64,
    pub end_us: i64,
    pub onset_us: i64,
}

impl GantrySummary {
    pub fn duration_us(&self) -> i64 { self.end_us - self.start_us }

    /// Offset that lines gantry motion onset up with the recording's start frame.
    pub fn default_offset_us(&self) -> i64 { self.onset_us - self.start_us }

    pub fn overlaps(&self, start_us: i64, end_us: i64) -> bool {
        self.start_us < end_us && self.end_us > start_us
    }
}

#[derive(Deserialize)]
struct TrajectoryRow {
    timestamp_us: String,
    x: f64,
    y: f64,
    z: f64,
}

/// Odometry log of the crane, stored column-wise for interpolation.
#[derive(Debug, Clone)]
pub struct GantryTrajectory {
    times: Vec<i64>,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl GantryTrajectory {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(f)).map_err(|e| Error::new(e.kind(), format!("{}: {e}", path.as_ref().display())))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut ret = Self { times: Vec::new(), x: Vec::new(), y: Vec::new(), z: Vec::new() };
        for row in csv.deserialize::<TrajectoryRow>() {
            let row = row?;
            let t = util::parse_micros(&row.timestamp_us)
                .ok_or_else(|| util::invalid_data(format!("invalid timestamp_us: {}", row.timestamp_us)))?;
            if let Some(&prev) = ret.times.last() {
                if t < prev {
                    return Err(util::invalid_data(format!("timestamp {t} goes back in time (previous {prev})")));
                }
            }
            ret.times.push(t);
            ret.x.push(row.x);
            ret.y.push(row.y);
            ret.z.push(row.z);
        }
        if ret.times.is_empty() {
            return Err(util::invalid_data("trajectory is empty"));
        }
        Ok(ret)
    }

    pub fn from_samples(samples: &[(i64, [f64; 3])]) -> Result<Self> {
        let mut ret = Self { times: Vec::new(), x: Vec::new(), y: Vec::new(), z: Vec::new() };
        for (t, p) in samples {
            if ret.times.last().is_some_and(|prev| t < prev) {
                return Err(util::invalid_data("samples are not ordered by time"));
            }
            ret.times.push(*t);
            ret.x.push(p[0]);
            ret.y.push(p[1]);
            ret.z.push(p[2]);
        }
        if ret.times.is_empty() {
            return Err(util::invalid_data("trajectory is empty"));
        }
        Ok(ret)
    }

    pub fn len(&self) -> usize { self.times.len() }
    pub fn is_empty(&self) -> bool { self.times.is_empty() }
    pub fn times(&self) -> &[i64] { &self.times }

    pub fn sample(&self, i: usize) -> Option<(i64, [f64; 3])> {
        Some((*self.times.get(i)?, [self.x[i], self.y[i], self.z[i]]))
    }

    pub fn start_us(&self) -> i64 { self.times[0] }
    pub fn end_us(&self)   -> i64 { self.times[self.times.len() - 1] }

    /// Position at `t`, holding the first/last sample outside of the recorded span.
    pub fn position_at(&self, t: i64) -> [f64; 3] {
        [
            util::interp(t, &self.times, &self.x),
            util::interp(t, &self.times, &self.y),
            util::interp(t, &self.times, &self.z),
        ]
    }

    /// Timestamp of the motion onset, or `None` if the crane never moved.
    /// Exact float comparison is intended, the odometry repeats values bit for bit while standing.
    pub fn motion_onset(&self, policy: OnsetPolicy) -> Option<i64> {
        let i = (1..self.times.len()).find(|&i| self.x[i] != self.x[i - 1] || self.y[i] != self.y[i - 1])?;
        Some(match policy {
            OnsetPolicy::FirstChange    => self.times[i],
            OnsetPolicy::LastStationary => self.times[i - 1],
        })
    }

    pub fn summary(&self, policy: OnsetPolicy) -> GantrySummary {
        let onset_us = self.motion_onset(policy).unwrap_or_else(|| {
            log::warn!("No motion found in gantry trajectory, using its start as onset");
            self.start_us()
        });
        GantrySummary { start_us: self.start_us(), end_us: self.end_us(), onset_us }
    }
}

/// One trajectory log together with its derived start/end/onset.
#[derive(Debug, Clone)]
pub struct GantrySession {
    pub label: String,
    pub path: PathBuf,
    pub summary: GantrySummary,
    pub trajectory: GantryTrajectory,
}

impl GantrySession {
    /// Takes the summary from the directory's `gantry_metadata.csv` and computes it
    /// from the trajectory when the index or its entry is missing.
    pub fn open<P: AsRef<Path>>(path: P, cache: &mut MetadataCache, policy: OnsetPolicy) -> Result<Self> {
        let path = path.as_ref();
        let label = util::folder_basename(path);
        let trajectory = GantryTrajectory::open(path)?;

        let dir = path.parent().unwrap_or(Path::new("."));
        let indexed = match cache.gantry_index(dir) {
            Ok(index) => index.get(&label).map(|x| x.summary()),
            Err(e) => {
                log::warn!("No usable {} in {}: {e}", GantryIndex::FILE_NAME, dir.display());
                None
            }
        };
        let summary = indexed.unwrap_or_else(|| {
            log::info!("{label}: computing motion onset from the trajectory");
            trajectory.summary(policy)
        });

        Ok(Self { label, path: path.to_path_buf(), summary, trajectory })
    }

    pub fn from_trajectory(label: &str, trajectory: GantryTrajectory, policy: OnsetPolicy) -> Self {
        let summary = trajectory.summary(policy);
        Self { label: label.to_owned(), path: PathBuf::from(label), summary, trajectory }
    }

    pub fn start_us(&self) -> i64 { self.summary.start_us }
    pub fn duration_us(&self) -> i64 { self.summary.duration_us() }

    /// Clamps `target_us` into the session and returns the interpolated position together
    /// with the timestamp actually used.
    pub fn odom_at(&self, target_us: i64) -> ([f64; 3], i64) {
        let t = target_us.clamp(self.summary.start_us, self.summary.start_us + self.summary.duration_us());
        (self.trajectory.position_at(t), t)
    }
}
