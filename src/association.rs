// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;
use std::io::*;
use std::path::Path;
use serde::{ Serialize, Deserialize };

use crate::sources::DatasetSources;
use crate::util;

fn lenient_i64<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    util::deserialize_micros(d)
}

/// One matched (ARIS, GoPro, gantry) tuple with the offsets that align it.
///
/// Fields are declared in alphabetical order, which is the column order of the match file.
/// An index of `-1` means the source is not part of the association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    #[serde(default)]
    pub aris_file: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub aris_idx: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub aris_onset: i64,
    #[serde(default)]
    pub gantry_file: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub gantry_idx: i64,
    /// Microseconds.
    #[serde(deserialize_with = "lenient_i64")]
    pub gantry_offset: i64,
    #[serde(default)]
    pub gopro_file: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub gopro_idx: i64,
    /// Frames.
    #[serde(deserialize_with = "lenient_i64")]
    pub gopro_offset: i64,
    #[serde(default)]
    pub notes: String,
}

impl Default for Association {
    fn default() -> Self {
        Self {
            aris_file: String::new(),
            aris_idx: -1,
            aris_onset: 0,
            gantry_file: String::new(),
            gantry_idx: -1,
            gantry_offset: 0,
            gopro_file: String::new(),
            gopro_idx: -1,
            gopro_offset: 0,
            notes: String::new(),
        }
    }
}

impl Association {
    pub fn has_gopro(&self)  -> bool { self.gopro_idx >= 0 }
    pub fn has_gantry(&self) -> bool { self.gantry_idx >= 0 }

    /// Export category taken from a `target: <name>` line in the notes, `other` without one.
    pub fn target_type(&self) -> String {
        for line in self.notes.lines() {
            if line.to_lowercase().contains("target:") {
                if let Some((_, name)) = line.split_once(':') {
                    return name.trim().to_lowercase().replace(' ', "_");
                }
            }
        }
        "other".into()
    }

    fn drop_gopro(&mut self) {
        self.gopro_idx = -1;
        self.gopro_file.clear();
    }

    fn drop_gantry(&mut self) {
        self.gantry_idx = -1;
        self.gantry_file.clear();
    }
}

/// Every association of a dataset, keyed by ARIS index.
#[derive(Debug, Clone, Default)]
pub struct AssociationTable {
    entries: BTreeMap<i64, Association>,
}

impl AssociationTable {
    pub fn new() -> Self { Self::default() }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::Fields)
            .from_path(path.as_ref())
            .map_err(|e| match e.into_kind() {
                csv::ErrorKind::Io(e) => Error::new(e.kind(), format!("{}: {e}", path.as_ref().display())),
                other => util::invalid_data(format!("{}: {other:?}", path.as_ref().display())),
            })?;

        let mut ret = Self::new();
        for row in csv.deserialize::<Association>() {
            let row = row?;
            if ret.entries.insert(row.aris_idx, row).is_some() {
                log::warn!("{}: duplicate ARIS index, keeping the last row", path.as_ref().display());
            }
        }
        Ok(ret)
    }

    /// Empty table when the file does not exist yet.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::load(path) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::new()),
            x => x,
        }
    }

    /// Fills in the file columns from `sources`, relative to the match file's directory
    /// where possible, and writes the table.
    pub fn save<P: AsRef<Path>>(&mut self, path: P, sources: &DatasetSources) -> Result<()> {
        let path = path.as_ref();
        let root = path.parent().unwrap_or(Path::new(""));
        let rel = |p: Option<&Path>| p.map(|p| p.strip_prefix(root).unwrap_or(p).to_string_lossy().into_owned()).unwrap_or_default();

        for a in self.entries.values_mut() {
            a.aris_file   = rel(sources.aris_path(a.aris_idx));
            a.gopro_file  = rel(sources.gopro_path(a.gopro_idx));
            a.gantry_file = rel(sources.gantry_path(a.gantry_idx));
        }
        self.write(path)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut csv = csv::Writer::from_path(path)?;
        for a in self.entries.values() {
            csv.serialize(a)?;
        }
        csv.flush()
    }

    /// Stores `association`, replacing any previous one of the same recording. Other
    /// associations lose their GoPro or gantry link if `association` takes it over, and
    /// are dropped once neither is left. Returns the ARIS indices that were dropped.
    pub fn associate(&mut self, association: Association) -> Vec<i64> {
        let mut dropped = Vec::new();
        for (&idx, old) in self.entries.iter_mut() {
            if idx == association.aris_idx { continue; }

            if association.has_gopro() && old.gopro_idx == association.gopro_idx {
                log::info!("GoPro clip {} moves from recording {idx} to {}", old.gopro_idx, association.aris_idx);
                old.drop_gopro();
            }
            if association.has_gantry() && old.gantry_idx == association.gantry_idx {
                log::info!("Gantry log {} moves from recording {idx} to {}", old.gantry_idx, association.aris_idx);
                old.drop_gantry();
            }
            if !old.has_gopro() && !old.has_gantry() {
                dropped.push(idx);
            }
        }
        for idx in &dropped {
            self.entries.remove(idx);
        }
        self.entries.insert(association.aris_idx, association);
        dropped
    }

    pub fn remove(&mut self, aris_idx: i64) -> Option<Association> { self.entries.remove(&aris_idx) }

    pub fn get(&self, aris_idx: i64) -> Option<&Association> { self.entries.get(&aris_idx) }
    pub fn iter(&self) -> impl Iterator<Item = &Association> { self.entries.values() }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn is_aris_associated(&self, idx: i64)   -> bool { self.entries.contains_key(&idx) }
    pub fn is_gopro_associated(&self, idx: i64)  -> bool { idx >= 0 && self.iter().any(|x| x.gopro_idx == idx) }
    pub fn is_gantry_associated(&self, idx: i64) -> bool { idx >= 0 && self.iter().any(|x| x.gantry_idx == idx) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assoc(aris: i64, gopro: i64, gantry: i64) -> Association {
        Association { aris_idx: aris, gopro_idx: gopro, gantry_idx: gantry, ..Default::default() }
    }

    #[test]
    fn target_type_from_notes() {
        let mut a = assoc(0, -1, -1);
        assert_eq!(a.target_type(), "other");
        a.notes = "calm water\nTarget: Metal Pipe \nmore".into();
        assert_eq!(a.target_type(), "metal_pipe");
    }

    #[test]
    fn associating_steals_links() {
        let mut table = AssociationTable::new();
        table.associate(assoc(0, 3, 5));
        table.associate(assoc(1, 4, 6));

        // Recording 2 takes clip 3 from 0 and log 6 from 1
        assert!(table.associate(assoc(2, 3, 6)).is_empty());
        assert_eq!(table.get(0), Some(&assoc(0, -1, 5)));
        assert_eq!(table.get(1), Some(&assoc(1, 4, -1)));

        // Recording 0 loses its last link and is dropped
        assert_eq!(table.associate(assoc(3, 7, 5)), [0]);
        assert!(table.get(0).is_none());
        assert_eq!(table.len(), 3);

        // Re-associating a recording replaces its entry
        table.associate(assoc(2, -1, 9));
        assert_eq!(table.get(2), Some(&assoc(2, -1, 9)));
        assert!(!table.is_gopro_associated(3));
        assert!(table.is_gantry_associated(9));
        assert!(!table.is_gantry_associated(-1));
    }

    #[test]
    fn each_source_appears_once() {
        let mut table = AssociationTable::new();
        for (a, g, t) in [(0, 0, 0), (1, 0, 1), (2, 1, 0), (0, 1, 1), (3, 2, 2)] {
            table.associate(assoc(a, g, t));
        }
        for idx in 0..3 {
            assert!(table.iter().filter(|x| x.gopro_idx == idx).count() <= 1);
            assert!(table.iter().filter(|x| x.gantry_idx == idx).count() <= 1);
        }
    }

    #[test]
    fn writes_sorted_header_and_reads_float_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matches.csv");

        let mut table = AssociationTable::new();
        table.associate(Association { gantry_offset: 1_500_000, notes: "a, b".into(), ..assoc(0, 1, 2) });
        table.write(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("aris_file,aris_idx,aris_onset,gantry_file,gantry_idx,gantry_offset,gopro_file,gopro_idx,gopro_offset,notes\n"));
        assert_eq!(AssociationTable::load(&path).unwrap().get(0), table.get(0));

        std::fs::write(&path, "aris_file,aris_idx,aris_onset,gantry_file,gantry_idx,gantry_offset,gopro_file,gopro_idx,gopro_offset,notes\n\
                               aris/rec,4,12,gantry/run.csv,1,2500000.0,,-1,0,\n").unwrap();
        let table = AssociationTable::load(&path).unwrap();
        let a = table.get(4).unwrap();
        assert_eq!((a.aris_onset, a.gantry_offset, a.has_gopro(), a.has_gantry()), (12, 2_500_000, false, true));
        assert_eq!(a.aris_file, "aris/rec");
    }

    #[test]
    fn missing_file_is_an_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.csv");
        assert_eq!(AssociationTable::load(&path).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(AssociationTable::load_or_default(&path).unwrap().is_empty());
    }
}
