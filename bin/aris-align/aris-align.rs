// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::*;
use std::path::{ Path, PathBuf };
use argh::FromArgs;

use aris_align::*;

/** aris-align v0.1.0

Time alignment, matching and export of ARIS sonar recordings with GoPro clips and gantry trajectories
*/
#[derive(FromArgs)]
struct Opts {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    GantryIndex(GantryIndexCmd),
    List(ListCmd),
    Associate(AssociateCmd),
    Inspect(InspectCmd),
    Export(ExportCmd),
}

/// Build the gantry_metadata.csv index of a directory of trajectory logs
#[derive(FromArgs)]
#[argh(subcommand, name = "gantry-index")]
struct GantryIndexCmd {
    /// directory with the trajectory logs
    #[argh(positional)]
    dir: PathBuf,

    /// motion onset policy: first_change or last_stationary
    #[argh(option, default = "OnsetPolicy::FirstChange")]
    policy: OnsetPolicy,
}

/// List recordings, clips and gantry logs with their association state
#[derive(FromArgs)]
#[argh(subcommand, name = "list")]
struct ListCmd {
    /// pipeline config.yaml
    #[argh(positional)]
    config: PathBuf,

    /// recording to check timestamp overlap against
    #[argh(option, default = "0")]
    aris: usize,
}

/// Associate a recording with a GoPro clip and/or a gantry log and save the match file
#[derive(FromArgs)]
#[argh(subcommand, name = "associate")]
struct AssociateCmd {
    /// pipeline config.yaml
    #[argh(positional)]
    config: PathBuf,

    /// recording index
    #[argh(option)]
    aris: usize,

    /// GoPro clip index
    #[argh(option)]
    gopro: Option<usize>,

    /// gantry log index
    #[argh(option)]
    gantry: Option<usize>,

    /// first frame of the active range, also saved as the recording's onset
    #[argh(option)]
    start: Option<usize>,

    /// GoPro offset in frames
    #[argh(option)]
    gopro_offset: Option<i64>,

    /// gantry offset in microseconds
    #[argh(option)]
    gantry_offset_us: Option<i64>,

    /// derive the gantry offset from the GoPro offset
    #[argh(switch)]
    couple: bool,

    /// free-form notes, a "Target: <name>" line selects the export folder
    #[argh(option)]
    notes: Option<String>,
}

/// Print the alignment of every frame in the active range as JSON lines
#[derive(FromArgs)]
#[argh(subcommand, name = "inspect")]
struct InspectCmd {
    /// pipeline config.yaml
    #[argh(positional)]
    config: PathBuf,

    /// recording index
    #[argh(positional)]
    aris: usize,
}

/// Export a bundle for every association in the match file
#[derive(FromArgs)]
#[argh(subcommand, name = "export")]
struct ExportCmd {
    /// pipeline config.yaml
    #[argh(positional)]
    config: PathBuf,
}

fn index_error(kind: &str, idx: usize) -> Error {
    Error::new(ErrorKind::InvalidInput, format!("no {kind} with index {idx}"))
}

/// Opens the recording at `aris` together with the selected clip and gantry log.
fn open_context(config: &Config, sources: &DatasetSources, cache: &mut MetadataCache, aris: usize, gopro: Option<&Path>, gantry: Option<&Path>) -> Result<MatchingContext> {
    let dir = sources.aris_path(aris as i64).ok_or_else(|| index_error("recording", aris))?;
    let recording = Recording::open(dir, &config.aris_to_polar_image_format, cache)?;
    let gantry = gantry.map(|x| GantrySession::open(x, cache, config.onset_policy)).transpose()?;
    let gopro = gopro.map(|x| GoProClip::open(x, &config.clip_options())).transpose()?;
    MatchingContext::new(recording, gantry, gopro)
}

fn associate(opts: AssociateCmd) -> Result<()> {
    let config = Config::load(&opts.config)?;
    let sources = config.sources()?;
    let mut table = AssociationTable::load_or_default(&config.match_file)?;
    let mut cache = MetadataCache::new();

    let gopro = opts.gopro.map(|i| sources.gopro_path(i as i64).ok_or_else(|| index_error("GoPro clip", i))).transpose()?;
    let gantry = opts.gantry.map(|i| sources.gantry_path(i as i64).ok_or_else(|| index_error("gantry log", i))).transpose()?;
    if gopro.is_none() && gantry.is_none() {
        return Err(Error::new(ErrorKind::InvalidInput, "an association needs a GoPro clip or a gantry log"));
    }

    let mut ctx = open_context(&config, &sources, &mut cache, opts.aris, gopro, gantry)?;
    let previous = table.get(opts.aris as i64).cloned();
    if let Some(prev) = &previous {
        ctx.apply(prev);
    }
    if let Some(start) = opts.start {
        let start = ctx.set_start(start);
        ctx.recording().save_onset(start)?;
    }
    if let Some(offset) = opts.gopro_offset {
        ctx.set_gopro_offset(offset);
    }
    if opts.couple {
        if ctx.couple_gantry_to_gopro().is_none() {
            log::warn!("Coupling the gantry offset needs both a GoPro clip and a gantry log");
        }
    } else if let Some(offset) = opts.gantry_offset_us {
        ctx.set_gantry_offset_us(offset);
    }

    let notes = opts.notes.or_else(|| previous.map(|x| x.notes)).unwrap_or_default();
    let association = ctx.to_association(opts.aris, opts.gopro, opts.gantry, &notes);
    log::info!("{}: start {}, GoPro offset {}, gantry offset {} us", ctx.recording().label, association.aris_onset, association.gopro_offset, association.gantry_offset);

    for idx in table.associate(association) {
        log::warn!("Recording {idx} lost all of its links and was removed");
    }
    table.save(&config.match_file, &sources)?;
    log::info!("Saved {} associations to {}", table.len(), config.match_file.display());
    Ok(())
}

fn inspect(opts: InspectCmd) -> Result<()> {
    let config = Config::load(&opts.config)?;
    let sources = config.sources()?;
    let table = AssociationTable::load_or_default(&config.match_file)?;
    let mut cache = MetadataCache::new();

    let association = table.get(opts.aris as i64);
    let root = config.data_root();
    let file = |x: &str| Some(x).filter(|x| !x.is_empty()).map(|x| root.join(x));
    let gopro = association.and_then(|a| file(&a.gopro_file));
    let gantry = association.and_then(|a| file(&a.gantry_file));

    let mut ctx = open_context(&config, &sources, &mut cache, opts.aris, gopro.as_deref(), gantry.as_deref())?;
    match association {
        Some(a) => ctx.apply(a),
        None => log::info!("Recording {} has no association, using defaults", opts.aris),
    }

    let flow = |cache: &mut MetadataCache, path: &Path| match cache.flow(path) {
        Ok(x) => Some(x),
        Err(e) => {
            log::debug!("No optical flow for {}: {e}", path.display());
            None
        }
    };
    let aris_flow = flow(&mut cache, &ctx.recording().dir);
    let gopro_flow = gopro.as_deref().and_then(|x| flow(&mut cache, x));
    ctx.set_flows(aris_flow, gopro_flow);

    let mut out = BufWriter::new(stdout().lock());
    for position in ctx.range().positions() {
        if let Some(alignment) = ctx.align(position) {
            serde_json::to_writer(&mut out, &alignment)?;
            writeln!(out)?;
        }
    }
    out.flush()
}

fn run(opts: Opts) -> Result<()> {
    match opts.command {
        Command::GantryIndex(opts) => {
            let index = GantryIndex::build(&opts.dir, opts.policy)?;
            let path = opts.dir.join(GantryIndex::FILE_NAME);
            index.write(&path)?;
            log::info!("Indexed {} gantry logs into {}", index.entries.len(), path.display());
        },
        Command::List(opts) => {
            let config = Config::load(&opts.config)?;
            let sources = config.sources()?;
            let table = AssociationTable::load_or_default(&config.match_file)?;
            let overview = sources.overview(&table, opts.aris, &mut MetadataCache::new(), config.gopro_utc_offset_hours);
            print!("{overview}");
        },
        Command::Associate(opts) => associate(opts)?,
        Command::Inspect(opts) => inspect(opts)?,
        Command::Export(opts) => {
            let config = Config::load(&opts.config)?;
            let table = AssociationTable::load(&config.match_file)?;
            let exported = export_all(&table, &config.data_root(), config.export_dir()?, &config.export_options(), &mut MetadataCache::new())?;
            log::info!("Exported {} of {} associations", exported.len(), table.len());
        },
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts: Opts = argh::from_env();

    if let Err(e) = run(opts) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
