// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::*;
use std::path::Path;
use serde::{ Serialize, Deserialize };

use super::{ GantrySummary, GantryTrajectory, OnsetPolicy };
use crate::util;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GantryIndexEntry {
    pub file: String,
    #[serde(deserialize_with = "util::deserialize_micros")]
    pub start_us: i64,
    #[serde(deserialize_with = "util::deserialize_micros")]
    pub end_us: i64,
    #[serde(deserialize_with = "util::deserialize_micros")]
    pub onset_us: i64,
}

impl GantryIndexEntry {
    pub fn summary(&self) -> GantrySummary {
        GantrySummary { start_us: self.start_us, end_us: self.end_us, onset_us: self.onset_us }
    }
}

/// Start, end and motion onset of every trajectory log in a directory.
#[derive(Debug, Clone, Default)]
pub struct GantryIndex {
    pub entries: Vec<GantryIndexEntry>,
}

impl GantryIndex {
    pub const FILE_NAME: &'static str = "gantry_metadata.csv";

    pub fn is_trajectory_file(path: &Path) -> bool {
        util::has_extension(path, "csv") && !util::folder_basename(path).to_lowercase().contains("metadata")
    }

    pub fn build<P: AsRef<Path>>(dir: P, policy: OnsetPolicy) -> Result<Self> {
        let mut entries = Vec::new();
        for path in util::list_sorted(dir.as_ref(), Self::is_trajectory_file)? {
            let file = util::folder_basename(&path);
            let s = GantryTrajectory::open(&path)?.summary(policy);
            log::info!("{file}: onset after {:.3} s", s.default_offset_us() as f64 / 1e6);
            entries.push(GantryIndexEntry { file, start_us: s.start_us, end_us: s.end_us, onset_us: s.onset_us });
        }
        Ok(Self { entries })
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;
        let entries = csv.deserialize().collect::<std::result::Result<Vec<GantryIndexEntry>, _>>()?;
        Ok(Self { entries })
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut csv = csv::Writer::from_path(path)?;
        for e in &self.entries {
            csv.serialize(e)?;
        }
        csv.flush()
    }

    pub fn get(&self, file: &str) -> Option<&GantryIndexEntry> {
        self.entries.iter().find(|x| x.file == file)
    }
}
