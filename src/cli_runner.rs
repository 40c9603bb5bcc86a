//! Command dispatch for the `cabforge` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

use crate::archive::{CabinetReader, ZcabCodec};
use crate::builder::CabinetBuilder;
use crate::cli::{self, Commands};
use crate::codec::NumberedContinuation;
use crate::manifest::BuildManifest;
use crate::sink::MessageSink;
use crate::CabinetError;

/// Parses the command line, sets up logging and runs the command.
///
/// Returns the process exit status: `0`, or the number of the last error the
/// build reported.
pub fn run_cli_app() -> Result<i32, Box<dyn std::error::Error>> {
    let command = cli::run()?;
    let verbose = matches!(command, Commands::Build { verbose: true, .. });
    init_tracing(verbose);
    run_command(&command)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

pub fn run_command(command: &Commands) -> Result<i32, Box<dyn std::error::Error>> {
    match command {
        Commands::Build {
            manifest,
            output,
            threads,
            max_cabinet_size,
            max_uncompressed_media_size,
            suppress_warnings,
            suppress_warning,
            warnings_as_errors,
            warning_as_error,
            ..
        } => {
            let document = BuildManifest::load(manifest)?;
            let source_dir = match manifest.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let output_dir = output.clone().unwrap_or_else(|| source_dir.clone());
            let items = document.work_items(&source_dir, &output_dir)?;
            for item in &items {
                if let Some(parent) = item.archive_path().parent() {
                    create_dir(parent)?;
                }
            }

            let mut split = document.settings.split;
            if let Some(size) = max_cabinet_size {
                split.max_cabinet_size_for_large_file_splitting = *size;
            }
            if let Some(size) = max_uncompressed_media_size {
                split.max_uncompressed_media_size = *size;
            }

            let threads = cli::resolve_threads(*threads, document.settings.threads);
            let mut builder = CabinetBuilder::new(threads, Arc::new(NumberedContinuation), ZcabCodec)?;
            builder.set_split_config(split);
            builder.enqueue_all(items);

            let sink = MessageSink::new(cli::sink_options(
                *suppress_warnings,
                suppress_warning,
                *warnings_as_errors,
                warning_as_error,
            ));
            let summary = builder.run(&sink);
            println!(
                "{} cabinet(s) built, {} failed ({} worker threads)",
                summary.built, summary.failed, summary.workers
            );
            Ok(sink.exit_code())
        }
        Commands::List { cabinet } => {
            let reader = CabinetReader::open(cabinet, &NumberedContinuation)?;
            println!("{} ({} volume(s))", cabinet.display(), reader.volumes().len());
            for entry in reader.entries() {
                println!(
                    "{:>6}  {:>12}  {:>12}  {}",
                    entry.sequence, entry.uncompressed_size, entry.stored_size, entry.id
                );
            }
            Ok(0)
        }
        Commands::Extract { cabinet, output } => {
            let reader = CabinetReader::open(cabinet, &NumberedContinuation)?;
            let written = reader.extract_all(output)?;
            println!("extracted {} file(s) to {}", written.len(), output.display());
            Ok(0)
        }
    }
}

fn create_dir(dir: &Path) -> Result<(), CabinetError> {
    fs::create_dir_all(dir).map_err(|e| CabinetError::io(dir, e))
}
