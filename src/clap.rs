// =============================================================================
// Matrixon Matrix NextServer - Clap Module
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Date: 2024-12-11
// Version: 2.0.0-alpha (Timeline Store)
// License: Apache 2.0 / MIT
//
// Description:
//   Command line argument definitions for the timeline replay tool.
//
// Features:
//   • Replay subcommand
//   • Global config and log level flags
//
// Dependencies:
//   • Structured logging with tracing
//   • Error handling with thiserror
//   • Serialization with serde
//   • Matrix protocol types with ruma
//
// References:
//   • Matrix spec: https://spec.matrix.org/
//   • Client-server sync: https://spec.matrix.org/latest/client-server-api/#syncing
//
// =============================================================================

use std::{path::PathBuf, time::Instant};

use clap::{Parser, Subcommand};
use tracing::{debug, instrument};

/// Returns the current version of the crate with extra info if supplied
///
/// Set the environment variable `MATRIXON_VERSION_EXTRA` at build time to any
/// UTF-8 string to include it in parenthesis after the SemVer version, for
/// example a git commit hash.
#[instrument(level = "debug")]
pub fn version() -> String {
    let cargo_pkg_version = env!("CARGO_PKG_VERSION");

    match option_env!("MATRIXON_VERSION_EXTRA") {
        Some(x) => format!("{} ({})", cargo_pkg_version, x),
        None => cargo_pkg_version.to_owned(),
    }
}

/// Matrixon timeline writer - replays Matrix sync responses into a local
/// timeline store
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(about, version, name = "matrixon-timeline")]
pub struct Args {
    /// Path to configuration file
    #[clap(short, long, env = "MATRIXON_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level override, as an EnvFilter directive (e.g. `debug`)
    #[clap(short, long, global = true)]
    pub log_level: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Write sync responses for one room, in order, and print the stored
    /// timeline
    Replay {
        /// Room the responses belong to (e.g. !abc:example.org)
        #[clap(long)]
        room: String,

        /// JSON files holding either the joined-room section of a sync
        /// response or a whole `/sync` response
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Parse command line arguments into structured config
pub fn parse() -> Args {
    let start = Instant::now();
    let args = Args::parse();
    debug!("✅ Command line arguments parsed in {:?}", start.elapsed());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_version_string_format() {
        let version_str = version();
        assert!(version_str.starts_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_parse_replay() {
        let args = Args::try_parse_from([
            "matrixon-timeline",
            "--log-level",
            "debug",
            "replay",
            "--room",
            "!room:example.org",
            "first.json",
            "second.json",
        ])
        .unwrap();

        assert_eq!(args.log_level.as_deref(), Some("debug"));
        let Commands::Replay { room, files } = args.command;
        assert_eq!(room, "!room:example.org");
        assert_eq!(files, vec![PathBuf::from("first.json"), PathBuf::from("second.json")]);
    }

    #[test]
    fn test_replay_requires_files() {
        assert!(Args::try_parse_from(["matrixon-timeline", "replay", "--room", "!room:example.org"]).is_err());
    }
}
