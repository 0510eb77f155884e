// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::*;
use std::path::{ Path, PathBuf };
use serde::Deserialize;

use crate::export::ExportOptions;
use crate::gantry::OnsetPolicy;
use crate::gopro::ClipOptions;
use crate::sources::DatasetSources;
use crate::util;

fn default_polar_format()     -> String { "png".into() }
fn default_clip_resolution()  -> String { "sd".into() }
fn default_export_resolution() -> String { "fhd".into() }
fn default_image_format()     -> String { "jpg".into() }
fn default_true()             -> bool { true }

/// Locations and options of the processing pipeline (`config.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub aris_extract: PathBuf,
    pub gopro_extract: PathBuf,
    pub gantry_extract: PathBuf,
    pub match_file: PathBuf,
    #[serde(default)]
    pub export_dir: Option<PathBuf>,

    #[serde(default = "default_polar_format")]
    pub aris_to_polar_image_format: String,
    /// `+` separated list, e.g. `sd+fhd`.
    #[serde(default = "default_clip_resolution")]
    pub gopro_clip_resolution: String,
    /// Frame rate of clips stored as image sequences.
    #[serde(default)]
    pub gopro_fps: Option<f64>,
    /// Extension of the images in clips stored as image sequences.
    #[serde(default = "default_image_format")]
    pub gopro_sequence_format: String,
    #[serde(default = "default_export_resolution")]
    pub export_gopro_resolution: String,
    /// Image format decoded video frames are exported as.
    #[serde(default = "default_image_format")]
    pub export_gopro_format: String,
    #[serde(default = "default_true")]
    pub export_only_with_gopro: bool,

    #[serde(default)]
    pub onset_policy: OnsetPolicy,
    /// Shift applied when showing GoPro creation times, which are stored in UTC.
    #[serde(default)]
    pub gopro_utc_offset_hours: i32,
}

impl Config {
    /// Relative paths are taken relative to the directory of the config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config: Config = util::read_yaml(path)?;
        let base = path.parent().unwrap_or(Path::new(""));
        for p in [&mut config.aris_extract, &mut config.gopro_extract, &mut config.gantry_extract, &mut config.match_file] {
            *p = base.join(&*p);
        }
        if let Some(p) = config.export_dir.as_mut() {
            *p = base.join(&*p);
        }
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(util::invalid_data)
    }

    /// Match file paths are stored relative to this directory.
    pub fn data_root(&self) -> PathBuf {
        self.match_file.parent().map(Path::to_path_buf).unwrap_or_default()
    }

    /// First existing `clips_<res>` directory, trying `sd`, the configured resolutions, `fhd` and `uhd`.
    pub fn gopro_clips_dir(&self) -> Result<PathBuf> {
        let configured = self.gopro_clip_resolution.split('+').map(str::trim).filter(|x| !x.is_empty());
        for res in std::iter::once("sd").chain(configured).chain(["fhd", "uhd"]) {
            let dir = self.gopro_extract.join(format!("clips_{res}"));
            if dir.is_dir() {
                return Ok(dir);
            }
        }
        Err(Error::new(ErrorKind::NotFound, format!("no GoPro clips directory in {}", self.gopro_extract.display())))
    }

    pub fn sources(&self) -> Result<DatasetSources> {
        DatasetSources::discover(self.aris_extract.clone(), self.gopro_clips_dir()?, self.gantry_extract.clone())
    }

    pub fn export_dir(&self) -> Result<&Path> {
        self.export_dir.as_deref().ok_or_else(|| Error::new(ErrorKind::InvalidInput, "export_dir is not configured"))
    }

    pub fn clip_options(&self) -> ClipOptions {
        ClipOptions {
            fps: self.gopro_fps,
            sequence_format: self.gopro_sequence_format.clone(),
            output_format: self.export_gopro_format.clone(),
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            polar_format: self.aris_to_polar_image_format.clone(),
            gopro_resolution: Some(self.export_gopro_resolution.clone()).filter(|x| !x.is_empty()),
            trim_to_gopro: self.export_only_with_gopro,
            onset_policy: self.onset_policy,
            clip: self.clip_options(),
        }
    }
}
