// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::*;
use std::path::{ Path, PathBuf };

use crate::util;

/// Per-frame optical flow magnitude of a recording or clip, scaled so that the
/// 95th percentile maps to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSignal {
    values: Vec<f64>,
}

impl FlowSignal {
    /// `<id>_flow.csv` inside a recording directory, or next to a clip file.
    pub fn cache_path(dataset: &Path) -> PathBuf {
        let folder = if dataset.is_dir() { dataset } else { dataset.parent().unwrap_or(Path::new("")) };
        folder.join(format!("{}_flow.csv", util::file_stem(util::folder_basename(dataset))))
    }

    pub fn load<P: AsRef<Path>>(dataset: P) -> Result<Self> {
        let path = Self::cache_path(dataset.as_ref());
        let f = std::fs::File::open(&path).map_err(|e| Error::new(e.kind(), format!("{}: {e}", path.display())))?;
        Self::from_reader(BufReader::new(f))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut values = Vec::new();
        for row in csv.records() {
            let row = row?;
            let Some(v) = row.get(0) else { continue; };
            values.push(v.parse::<f64>().map_err(|e| util::invalid_data(format!("invalid flow value {v}: {e}")))?);
        }
        Ok(Self::from_raw(values))
    }

    /// Normalizes to `(v - min) / (q95 - min)`, unless that span is zero.
    pub fn from_raw(mut values: Vec<f64>) -> Self {
        let (Some(min), Some(q95)) = (values.iter().copied().reduce(f64::min), util::quantile(&values, 0.95)) else {
            return Self { values };
        };
        let norm = q95 - min;
        if norm.abs() > 1e-8 {
            values.iter_mut().for_each(|v| *v = (*v - min) / norm);
        }
        Self { values }
    }

    pub fn values(&self) -> &[f64] { &self.values }
    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Value at a frame index, `None` outside of the signal.
    pub fn at(&self, index: i64) -> Option<f64> {
        usize::try_from(index).ok().and_then(|i| self.values.get(i).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_by_95th_percentile() {
        let raw: Vec<f64> = (0..=100).map(|x| x as f64 + 10.0).collect();
        let flow = FlowSignal::from_raw(raw);
        assert_eq!(flow.values()[0], 0.0);
        assert!((flow.values()[95] - 1.0).abs() < 1e-12);
        assert!(flow.values()[100] > 1.0);
    }

    #[test]
    fn constant_signal_is_left_alone() {
        let flow = FlowSignal::from_raw(vec![3.0; 4]);
        assert_eq!(flow.values(), [3.0; 4]);
        assert!(FlowSignal::from_raw(Vec::new()).is_empty());
    }

    #[test]
    fn indexes_by_frame() {
        let flow = FlowSignal { values: vec![0.0, 3.0, 6.0] };
        assert_eq!(flow.at(1), Some(3.0));
        assert_eq!(flow.at(3), None);
        assert_eq!(flow.at(-1), None);
    }

    #[test]
    fn finds_cache_next_to_the_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let rec = dir.path().join("2022-05-10_101010");
        std::fs::create_dir_all(&rec).unwrap();
        std::fs::write(rec.join("2022-05-10_101010_flow.csv"), "0.0\n1.0\n2.0\n").unwrap();
        std::fs::write(dir.path().join("GX010001_01_flow.csv"), "5\n5\n").unwrap();

        assert_eq!(FlowSignal::load(&rec).unwrap().len(), 3);
        let clip = FlowSignal::load(dir.path().join("GX010001_01.MP4")).unwrap();
        assert_eq!(clip.values(), [5.0, 5.0]);
        assert_eq!(FlowSignal::load(dir.path().join("other.MP4")).unwrap_err().kind(), ErrorKind::NotFound);
    }
}
