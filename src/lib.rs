// SPDX-License-Identifier: MIT OR Apache-2.0

#[macro_use]
pub mod util;

pub mod aris;
pub mod association;
pub mod cache;
pub mod config;
pub mod context;
pub mod export;
pub mod flow;
pub mod gantry;
pub mod gopro;
pub mod sources;

pub use aris::{ Recording, RecordingMeta, FrameTable, Marks };
pub use association::{ Association, AssociationTable };
pub use cache::MetadataCache;
pub use config::Config;
pub use context::{ ActiveRange, Alignment, Elapsed, GantryOdom, MatchingContext };
pub use export::{ ExportOptions, ExportSummary, export_all, export_recording };
pub use flow::FlowSignal;
pub use gantry::{ GantryIndex, GantrySession, GantryTrajectory, OnsetPolicy };
pub use gopro::{ ClipOptions, Frame, FrameSource, GoProClip, GoProMetadata };
pub use sources::{ DatasetSources, Overview };
