// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs;
use std::io::*;
use std::path::{ Component, Path, PathBuf };
use serde::Serialize;

use crate::aris::{ Recording, RAW_FRAME_EXTENSION };
use crate::association::{ Association, AssociationTable };
use crate::cache::MetadataCache;
use crate::context::MatchingContext;
use crate::gantry::{ GantrySession, OnsetPolicy };
use crate::gopro::{ ClipOptions, GoProClip };
use crate::util;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub polar_format: String,
    /// Replaces the `clips_<res>` directory of associated clips, e.g. `fhd`.
    pub gopro_resolution: Option<String>,
    /// Only export frames that have a GoPro frame, when the recording has a clip.
    pub trim_to_gopro: bool,
    pub onset_policy: OnsetPolicy,
    pub clip: ClipOptions,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            polar_format: "png".into(),
            gopro_resolution: None,
            trim_to_gopro: true,
            onset_policy: OnsetPolicy::default(),
            clip: ClipOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub label: String,
    pub dir: PathBuf,
    /// Recording positions that were written.
    pub frames: Vec<usize>,
    pub gopro_frames: usize,
}

#[derive(Serialize)]
struct GantryRow {
    aris_frame_idx: usize,
    x: f64,
    y: f64,
    z: f64,
}

/// Points a clip path at another resolution by replacing its `clips_<res>` component.
pub fn switch_resolution(path: &Path, resolution: &str) -> PathBuf {
    path.components().map(|c| match c {
        Component::Normal(x) if x.to_string_lossy().starts_with("clips_") => PathBuf::from(format!("clips_{resolution}")),
        other => PathBuf::from(other.as_os_str()),
    }).collect()
}

fn frame_name(position: usize, extension: &str) -> String {
    format!("{position:04}.{extension}")
}

/// Writes the bundle of one association to `<out_root>/<target type>/<recording>/`.
///
/// The bundle directory must not exist yet. It is assembled in a hidden sibling directory and
/// renamed into place when complete, so a failed export leaves nothing behind.
/// Paths in `association` are relative to `data_root`.
pub fn export_recording(association: &Association, data_root: &Path, out_root: &Path, options: &ExportOptions, cache: &mut MetadataCache) -> Result<ExportSummary> {
    if association.aris_file.is_empty() {
        return Err(Error::new(ErrorKind::InvalidInput, format!("association {} has no recording", association.aris_idx)));
    }
    let recording = Recording::open(data_root.join(&association.aris_file), &options.polar_format, cache)?;

    let group = out_root.join(association.target_type());
    let root = group.join(&recording.label);
    if root.exists() {
        return Err(Error::new(ErrorKind::AlreadyExists, format!("{} already exists", root.display())));
    }

    let gantry = match association.gantry_file.as_str() {
        "" => None,
        file => Some(GantrySession::open(data_root.join(file), cache, options.onset_policy)?),
    };
    let gopro = match association.gopro_file.as_str() {
        "" => None,
        file => {
            let mut path = data_root.join(file);
            if let Some(res) = &options.gopro_resolution {
                path = switch_resolution(&path, res);
                if !path.exists() {
                    return Err(Error::new(ErrorKind::NotFound, format!("{res}: missing GoPro file {}", path.display())));
                }
            }
            let clip = GoProClip::open(&path, &options.clip)?;
            if !clip.decodes() {
                return Err(Error::new(ErrorKind::Unsupported, format!("{}: cannot decode GoPro frames, enable the `video` feature", path.display())));
            }
            Some(clip)
        }
    };

    let mut ctx = MatchingContext::new(recording, gantry, gopro)?;
    ctx.apply(association);
    let label = ctx.recording().label.clone();

    fs::create_dir_all(&group)?;
    let staging = group.join(format!(".{label}.partial"));
    if staging.exists() {
        log::warn!("{label}: removing leftovers of an interrupted export in {}", staging.display());
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir(&staging)?;

    let written = write_bundle(&mut ctx, association, options, &staging).and_then(|x| {
        fs::rename(&staging, &root)?;
        Ok(x)
    });
    let (frames, gopro_frames) = match written {
        Ok(x) => x,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                log::warn!("{label}: cannot remove {}: {cleanup}", staging.display());
            }
            return Err(e);
        }
    };

    log::info!("{label}: exported {} frames ({gopro_frames} with GoPro) to {}", frames.len(), root.display());
    Ok(ExportSummary { label, dir: root, frames, gopro_frames })
}

/// Fills `root` with the bundle contents. Returns the written positions and the GoPro frame count.
fn write_bundle(ctx: &mut MatchingContext, association: &Association, options: &ExportOptions, root: &Path) -> Result<(Vec<usize>, usize)> {
    let label = ctx.recording().label.clone();

    let raw_dir = root.join("aris_raw");
    fs::create_dir(&raw_dir)?;
    let polar_dir = root.join("aris_polar");
    if ctx.recording().frames_polar.is_some() {
        fs::create_dir(&polar_dir)?;
    } else {
        log::warn!("{label}: no polar frames to export");
    }
    let gopro_dir = root.join("gopro");
    let gopro_ext = ctx.gopro().map(|x| x.extension().to_owned());
    if gopro_ext.is_some() {
        fs::create_dir(&gopro_dir)?;
    }

    let mut frames = Vec::new();
    let mut gopro_frames = 0;
    let mut gantry_rows = Vec::new();
    for position in ctx.range().positions() {
        let Some(time) = ctx.aris_frametime(position) else { break; };

        if let Some(ext) = &gopro_ext {
            let lookup = ctx.gopro_frame(time, true);
            match lookup.frame {
                Some(frame) => {
                    fs::write(gopro_dir.join(frame_name(position, ext)), &frame.data)?;
                    gopro_frames += 1;
                },
                None if options.trim_to_gopro => {
                    log::debug!("{label}: no GoPro frame {} for frame {position}, skipping", lookup.requested);
                    continue;
                },
                None => log::debug!("{label}: no GoPro frame {} for frame {position}", lookup.requested),
            }
        }

        let raw = &ctx.recording().frames_raw[position];
        fs::copy(raw, raw_dir.join(frame_name(position, RAW_FRAME_EXTENSION)))
            .map_err(|e| Error::new(e.kind(), format!("{}: {e}", raw.display())))?;

        if let Some(polar) = &ctx.recording().frames_polar {
            fs::copy(&polar[position], polar_dir.join(frame_name(position, &options.polar_format)))
                .map_err(|e| Error::new(e.kind(), format!("{}: {e}", polar[position].display())))?;
        }

        if let Some(odom) = ctx.gantry_odom(time) {
            let [x, y, z] = odom.position;
            gantry_rows.push(GantryRow { aris_frame_idx: position, x, y, z });
        }
        frames.push(position);
    }

    match (frames.first(), frames.last()) {
        (Some(first), Some(last)) if frames.len() != ctx.active_frames() => log::info!("{label}: trimmed to frames {first} to {last}"),
        (None, _) => log::warn!("{label}: no frames exported"),
        _ => {}
    }

    ctx.recording().frames().write_rows(BufWriter::new(fs::File::create(root.join("aris_frame_meta.csv"))?), &frames)?;
    util::write_yaml(root.join("aris_file_meta.yaml"), &ctx.recording().meta.file_meta)?;

    if ctx.has_gantry() {
        let mut csv = csv::Writer::from_path(root.join("gantry.csv"))?;
        for row in &gantry_rows {
            csv.serialize(row)?;
        }
        csv.flush()?;
    }
    fs::write(root.join("notes.txt"), &association.notes)?;

    Ok((frames, gopro_frames))
}

/// Exports every association. Bundles that already exist are left alone, failed exports
/// are logged and the remaining associations still get exported.
pub fn export_all(table: &AssociationTable, data_root: &Path, out_root: &Path, options: &ExportOptions, cache: &mut MetadataCache) -> Result<Vec<ExportSummary>> {
    fs::create_dir_all(out_root)?;
    let mut ret = Vec::new();
    let mut failed = 0;
    for association in table.iter() {
        match export_recording(association, data_root, out_root, options, cache) {
            Ok(summary) => ret.push(summary),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                log::warn!("Skipping {}: {e}", association.aris_file);
            },
            Err(e) => {
                log::error!("Exporting {} failed: {e}", association.aris_file);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        log::error!("{failed} of {} exports failed", table.len());
    }
    Ok(ret)
}
