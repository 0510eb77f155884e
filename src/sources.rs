// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::io::*;
use std::path::{ Path, PathBuf };

use crate::association::AssociationTable;
use crate::cache::MetadataCache;
use crate::gantry::GantryIndex;
use crate::gopro::gopro_sorting_key;
use crate::util;

/// The recordings, clips and gantry logs a dataset is matched from. Associations refer
/// to them by their position in these lists.
#[derive(Debug, Clone, Default)]
pub struct DatasetSources {
    pub aris: Vec<PathBuf>,
    pub gopro: Vec<PathBuf>,
    pub gantry: Vec<PathBuf>,
}

impl DatasetSources {
    pub fn discover<P: AsRef<Path>>(aris_dir: P, gopro_dir: P, gantry_dir: P) -> Result<Self> {
        let aris = util::list_sorted(aris_dir, |x| x.is_dir())?;
        let mut gopro = util::list_sorted(gopro_dir, |x| x.is_file() && util::has_extension(x, "mp4"))?;
        gopro.sort_by_key(|x| gopro_sorting_key(x));
        let gantry = util::list_sorted(gantry_dir, GantryIndex::is_trajectory_file)?;

        log::info!("Found {} ARIS recordings, {} GoPro clips and {} gantry logs", aris.len(), gopro.len(), gantry.len());
        Ok(Self { aris, gopro, gantry })
    }

    fn at(list: &[PathBuf], idx: i64) -> Option<&Path> {
        usize::try_from(idx).ok().and_then(|i| list.get(i)).map(PathBuf::as_path)
    }

    pub fn aris_path(&self, idx: i64)   -> Option<&Path> { Self::at(&self.aris, idx) }
    pub fn gopro_path(&self, idx: i64)  -> Option<&Path> { Self::at(&self.gopro, idx) }
    pub fn gantry_path(&self, idx: i64) -> Option<&Path> { Self::at(&self.gantry, idx) }

    pub fn aris_index(&self, path: &Path) -> Option<usize> { self.aris.iter().position(|x| x == path) }

    /// Status of every source with respect to `table`, overlap is checked against the
    /// time span of the recording at `selected_aris`.
    pub fn overview(&self, table: &AssociationTable, selected_aris: usize, cache: &mut MetadataCache, utc_offset_hours: i32) -> Overview {
        let mut span = None;
        let mut aris = Vec::with_capacity(self.aris.len());
        for (idx, dir) in self.aris.iter().enumerate() {
            let (has_onset, this_span) = match cache.recording(dir) {
                Ok(meta) => (meta.onset().is_some(), Some((meta.frames.first_time(), meta.frames.last_time()))),
                Err(e) => {
                    log::warn!("{}: {e}", dir.display());
                    (false, None)
                }
            };
            if idx == selected_aris { span = this_span; }
            aris.push(SourceStatus {
                index: idx,
                label: util::folder_basename(dir),
                associated: table.is_aris_associated(idx as i64),
                flag: has_onset,
            });
        }

        let mut gopro = Vec::with_capacity(self.gopro.len());
        for (idx, file) in self.gopro.iter().enumerate() {
            let name = util::folder_basename(file);
            let meta = file.parent().and_then(|dir| cache.gopro_metadata(dir).ok());
            let info = meta.as_ref().and_then(|m| m.get(&name));
            let label = match info.and_then(|x| x.creation_label(utc_offset_hours)) {
                Some(created) => format!("{created}  {name}"),
                None => name.clone(),
            };
            gopro.push(SourceStatus {
                index: idx,
                label,
                associated: table.is_gopro_associated(idx as i64),
                flag: span.is_some_and(|(s, e)| info.is_some_and(|x| x.overlaps(s, e))),
            });
        }

        let mut gantry = Vec::with_capacity(self.gantry.len());
        for (idx, file) in self.gantry.iter().enumerate() {
            let name = util::folder_basename(file);
            let index = file.parent().and_then(|dir| cache.gantry_index(dir).ok());
            let entry = index.as_ref().and_then(|x| x.get(&name)).map(|x| x.summary());
            gantry.push(SourceStatus {
                index: idx,
                label: name,
                associated: table.is_gantry_associated(idx as i64),
                flag: span.is_some_and(|(s, e)| entry.is_some_and(|x| x.overlaps(s, e))),
            });
        }

        Overview { aris, gopro, gantry }
    }
}

/// One line of the source listing. `flag` is "has motion onset" for recordings and
/// "overlaps the selected recording" for clips and gantry logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub index: usize,
    pub label: String,
    pub associated: bool,
    pub flag: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Overview {
    pub aris: Vec<SourceStatus>,
    pub gopro: Vec<SourceStatus>,
    pub gantry: Vec<SourceStatus>,
}

impl fmt::Display for Overview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let section = |f: &mut fmt::Formatter<'_>, title: &str, flag: char, items: &[SourceStatus]| -> fmt::Result {
            writeln!(f, "{title}")?;
            for x in items {
                writeln!(f, "({}) ({})  {:02}: {}", if x.associated { '*' } else { ' ' }, if x.flag { flag } else { ' ' }, x.index, x.label)?;
            }
            Ok(())
        };
        writeln!(f, "(*) associated  (m) has motion onset  (x) has timestamp overlap")?;
        section(f, "ARIS", 'm', &self.aris)?;
        section(f, "GoPro", 'x', &self.gopro)?;
        section(f, "Gantry", 'x', &self.gantry)
    }
}
