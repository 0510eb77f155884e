// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::*;
use std::path::Path;
use serde::{ Serialize, Deserialize };

/// Manual annotations of a recording. A negative onset means "not set".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Marks {
    #[serde(default = "unset_onset")]
    pub onset: i64,
    #[serde(default)]
    pub marks: Vec<usize>,
}

fn unset_onset() -> i64 { -1 }

impl Marks {
    pub fn new(onset: Option<usize>, mut marks: Vec<usize>) -> Self {
        marks.sort_unstable();
        marks.dedup();
        Self { onset: onset.map(|x| x as i64).unwrap_or(-1), marks }
    }

    pub fn onset(&self) -> Option<usize> {
        if self.onset >= 0 { Some(self.onset as usize) } else { None }
    }

    /// Absent and malformed files both mean "nothing recorded".
    pub fn load<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return None;
        }
        match crate::util::read_yaml::<Self, _>(path) {
            Ok(m) => Some(m),
            Err(e) => {
                log::warn!("Ignoring malformed marks file {}: {e}", path.display());
                None
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::util::write_yaml(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec_marks.yaml");
        let marks = Marks::new(Some(12), vec![40, 30, 40]);
        marks.save(&path).unwrap();

        let loaded = Marks::load(&path).unwrap();
        assert_eq!(loaded.onset(), Some(12));
        assert_eq!(loaded.marks, vec![30, 40]);
    }

    #[test]
    fn negative_onset_is_unset() {
        let m: Marks = serde_yaml::from_str("onset: -1\nmarks: []\n").unwrap();
        assert_eq!(m.onset(), None);
        let m: Marks = serde_yaml::from_str("marks: [3]\n").unwrap();
        assert_eq!(m.onset(), None);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec_marks.yaml");
        std::fs::write(&path, "onset: [not, a, number]\n").unwrap();
        assert_eq!(Marks::load(&path), None);
        assert_eq!(Marks::load(dir.path().join("missing.yaml")), None);
    }
}
