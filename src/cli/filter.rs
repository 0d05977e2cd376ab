//! Filter command implementation.
//!
//! Prints the files holding at least one live declaration, one per line.

use std::path::{Path, PathBuf};

use clap::Args;

use crate::config::collect_sources;
use crate::error::Result;
use crate::output::{plural, Printer};
use crate::pipeline::Pipeline;

use super::ProjectArgs;

/// Print the files that contain live buffer declarations
#[derive(Args, Debug)]
pub struct FilterArgs {
    /// Source files or directories (default: current directory)
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

pub fn run(args: FilterArgs, config: Option<&Path>, printer: &Printer) -> Result<()> {
    let settings = args.project.settings(config, None)?;
    let roots = if args.paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        args.paths
    };
    let files = collect_sources(&roots, &settings.manifest);

    let pipeline = Pipeline::new(settings);
    let live = pipeline.filter(&files)?;
    for path in &live {
        println!("{}", path.display());
    }

    printer.info(
        "Filtered",
        &format!(
            "{} of {}",
            plural(live.len(), "file", "files"),
            files.len()
        ),
    );
    Ok(())
}
