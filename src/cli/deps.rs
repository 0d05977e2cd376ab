//! Deps command implementation.

use std::path::{Path, PathBuf};

use clap::Args;

use crate::error::{BufferError, Result};
use crate::output::Printer;
use crate::pipeline::Pipeline;

use super::ProjectArgs;

/// Print the data files a source depends on
#[derive(Args, Debug)]
pub struct DepsArgs {
    /// Source file to scan
    pub file: PathBuf,

    /// Print a JSON array instead of one path per line
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub project: ProjectArgs,
}

pub fn run(args: DepsArgs, config: Option<&Path>, _printer: &Printer) -> Result<()> {
    let settings = args.project.settings(config, None)?;
    let set = Pipeline::new(settings).deps(&args.file)?;

    if args.json {
        let paths: Vec<String> = set.paths().iter().map(|p| p.display().to_string()).collect();
        let json = serde_json::to_string_pretty(&paths).map_err(|e| BufferError::Io {
            path: args.file.clone(),
            message: format!("Failed to serialise dependencies: {}", e),
        })?;
        println!("{}", json);
    } else {
        for path in set.paths() {
            println!("{}", path.display());
        }
    }
    Ok(())
}
