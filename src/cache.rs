// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::io::*;
use std::path::{ Path, PathBuf };
use std::rc::Rc;

use crate::aris::RecordingMeta;
use crate::flow::FlowSignal;
use crate::gantry::GantryIndex;
use crate::gopro::GoProMetadata;

/// Parsed metadata keyed by the path it was loaded from.
///
/// Entries are never evicted: a dataset holds a few hundred recordings at most, so everything
/// stays resident until the cache is dropped or [`MetadataCache::clear`] is called.
/// Only successful loads are cached, a failed load is retried on the next request.
#[derive(Default)]
pub struct MetadataCache {
    recordings: HashMap<PathBuf, Rc<RecordingMeta>>,
    gantry_indices: HashMap<PathBuf, Rc<GantryIndex>>,
    gopro_metadata: HashMap<PathBuf, Rc<GoProMetadata>>,
    flows: HashMap<PathBuf, Rc<FlowSignal>>,
}

fn get_or_load<T, F: FnOnce(&Path) -> Result<T>>(map: &mut HashMap<PathBuf, Rc<T>>, key: &Path, load: F) -> Result<Rc<T>> {
    if let Some(v) = map.get(key) {
        return Ok(v.clone());
    }
    let v = Rc::new(load(key)?);
    map.insert(key.to_path_buf(), v.clone());
    Ok(v)
}

impl MetadataCache {
    pub fn new() -> Self { Self::default() }

    pub fn recording(&mut self, dir: &Path) -> Result<Rc<RecordingMeta>> {
        get_or_load(&mut self.recordings, dir, |d| RecordingMeta::load(d))
    }

    /// `gantry_metadata.csv` of a gantry extraction directory.
    pub fn gantry_index(&mut self, dir: &Path) -> Result<Rc<GantryIndex>> {
        get_or_load(&mut self.gantry_indices, dir, |d| GantryIndex::read(d.join(GantryIndex::FILE_NAME)))
    }

    /// `gopro_metadata.csv` of a GoPro clip directory.
    pub fn gopro_metadata(&mut self, dir: &Path) -> Result<Rc<GoProMetadata>> {
        get_or_load(&mut self.gopro_metadata, dir, |d| GoProMetadata::read(d.join(GoProMetadata::FILE_NAME)))
    }

    pub fn flow(&mut self, dataset: &Path) -> Result<Rc<FlowSignal>> {
        get_or_load(&mut self.flows, dataset, |d| FlowSignal::load(d))
    }

    pub fn len(&self) -> usize {
        self.recordings.len() + self.gantry_indices.len() + self.gopro_metadata.len() + self.flows.len()
    }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn clear(&mut self) {
        self.recordings.clear();
        self.gantry_indices.clear();
        self.gopro_metadata.clear();
        self.flows.clear();
    }
}
