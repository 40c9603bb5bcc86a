use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::sink::SinkOptions;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Build every cabinet described by a JSON manifest.
    #[command(alias = "b")]
    Build {
        /// The build manifest. Relative source paths are resolved against its directory.
        #[arg(required = true)]
        manifest: PathBuf,

        /// Directory that relative cabinet paths are resolved against. Defaults to the manifest's directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of cabinets built in parallel. [0 = auto-detect based on CPU cores]
        #[arg(long)]
        threads: Option<usize>,

        /// Maximum cabinet size in MiB when splitting a single large file. [0 = never split]
        #[arg(long)]
        max_cabinet_size: Option<u32>,

        /// Uncompressed size in MB from which a lone file is split across cabinets.
        #[arg(long)]
        max_uncompressed_media_size: Option<u32>,

        /// Show verbose messages.
        #[arg(short, long)]
        verbose: bool,

        /// Suppress all warnings.
        #[arg(long)]
        suppress_warnings: bool,

        /// Suppress one warning by number. May be repeated.
        #[arg(long = "suppress-warning", value_name = "N")]
        suppress_warning: Vec<i32>,

        /// Treat all warnings as errors.
        #[arg(long)]
        warnings_as_errors: bool,

        /// Treat one warning as an error by number. May be repeated.
        #[arg(long = "warning-as-error", value_name = "N")]
        warning_as_error: Vec<i32>,
    },

    /// List the files stored in a cabinet, following its continuation volumes.
    #[command(alias = "l")]
    List {
        /// The primary cabinet file.
        #[arg(required = true)]
        cabinet: PathBuf,
    },

    /// Extract every file of a cabinet, named by file id.
    #[command(alias = "x")]
    Extract {
        /// The primary cabinet file.
        #[arg(required = true)]
        cabinet: PathBuf,

        /// The directory where files will be extracted.
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Builds the message sink settings from the warning flags of `build`.
pub fn sink_options(
    suppress_warnings: bool,
    suppress_warning: &[i32],
    warnings_as_errors: bool,
    warning_as_error: &[i32],
) -> SinkOptions {
    SinkOptions {
        suppress_all_warnings: suppress_warnings,
        warnings_as_errors,
        suppressed_warnings: suppress_warning.iter().copied().collect::<HashSet<_>>(),
        elevated_warnings: warning_as_error.iter().copied().collect::<HashSet<_>>(),
    }
}

/// Resolves the worker thread count.
///
/// Priority:
/// 1. `--threads` command-line argument.
/// 2. `CABFORGE_THREADS` environment variable.
/// 3. `settings.threads` from the manifest.
///
/// `0` or nothing at all means one thread per CPU core.
pub fn resolve_threads(threads_opt: Option<usize>, manifest_threads: Option<usize>) -> usize {
    let env_threads = std::env::var("CABFORGE_THREADS")
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok());
    let requested = threads_opt.or(env_threads).or(manifest_threads).unwrap_or(0);
    if requested == 0 {
        num_cpus::get().max(1)
    } else {
        requested
    }
}

/// Parses command-line arguments using `clap` and returns the command to execute.
pub fn run() -> Result<Commands, Box<dyn std::error::Error>> {
    let args = Args::parse();
    Ok(args.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_threads_win() {
        assert_eq!(resolve_threads(Some(3), Some(8)), 3);
    }

    #[test]
    fn zero_means_auto() {
        assert!(resolve_threads(Some(0), None) >= 1);
    }

    #[test]
    fn parses_build_flags() {
        let args = Args::try_parse_from([
            "cabforge",
            "build",
            "media.json",
            "--threads",
            "4",
            "--max-cabinet-size",
            "1024",
            "--suppress-warning",
            "1001",
            "--warning-as-error",
            "1002",
        ])
        .unwrap();
        match args.command {
            Commands::Build { threads, max_cabinet_size, suppress_warning, warning_as_error, .. } => {
                assert_eq!(threads, Some(4));
                assert_eq!(max_cabinet_size, Some(1024));
                let options = sink_options(false, &suppress_warning, false, &warning_as_error);
                assert!(options.suppressed_warnings.contains(&1001));
                assert!(options.elevated_warnings.contains(&1002));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
