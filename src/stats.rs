//! Processing counters.
//!
//! Updated by ingestion, simplification, export and snapshot loading. Nothing in
//! the crate reads them back for control flow.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Counters per entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetStats {
    pub tracks_loaded: u64,
    pub tracks_processed: u64,

    pub points_loaded: u64,
    pub points_processed: u64,
    pub points_created: u64,
    pub points_reused: u64,
    pub points_simplified: u64,
    pub points_final: u64,
    pub points_rendered: u64,

    pub edges_loaded: u64,
    pub edges_created: u64,
    pub edges_reused: u64,
    pub edges_simplified: u64,
    pub edges_final: u64,
    pub edges_rendered: u64,

    pub segments_processed: u64,
    pub segments_simplified: u64,
    pub segments_rendered: u64,
}

impl fmt::Display for NetStats {
    /// Plain-text summary, one row per entity kind.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<10}{:>10}{:>11}{:>9}{:>9}{:>12}{:>8}{:>10}",
            "entity", "loaded", "processed", "reused", "created", "simplified", "final", "rendered"
        )?;
        writeln!(
            f,
            "{:<10}{:>10}{:>11}{:>9}{:>9}{:>12}{:>8}{:>10}",
            "tracks", self.tracks_loaded, self.tracks_processed, "-", "-", "-", self.tracks_processed, "-"
        )?;
        writeln!(
            f,
            "{:<10}{:>10}{:>11}{:>9}{:>9}{:>12}{:>8}{:>10}",
            "points",
            self.points_loaded,
            self.points_processed,
            self.points_reused,
            self.points_created,
            self.points_simplified,
            self.points_final,
            self.points_rendered
        )?;
        writeln!(
            f,
            "{:<10}{:>10}{:>11}{:>9}{:>9}{:>12}{:>8}{:>10}",
            "edges",
            self.edges_loaded,
            "-",
            self.edges_reused,
            self.edges_created,
            self.edges_simplified,
            self.edges_final,
            self.edges_rendered
        )?;
        write!(
            f,
            "{:<10}{:>10}{:>11}{:>9}{:>9}{:>12}{:>8}{:>10}",
            "segments",
            "-",
            self.segments_processed,
            "-",
            "-",
            self.segments_simplified,
            "-",
            self.segments_rendered
        )
    }
}
