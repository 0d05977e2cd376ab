//! Generate command implementation.
//!
//! Runs the full pipeline for one source file and reports each buffer.

use std::path::{Path, PathBuf};

use clap::Args;

use crate::error::Result;
use crate::output::{display_path, plural, Printer};
use crate::pipeline::{Outcome, Pipeline};

use super::ProjectArgs;

/// Generate the buffer header for a source file
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Source file holding the declarations
    pub input: PathBuf,

    /// Header to write
    pub output: PathBuf,

    /// Values per line in emitted arrays
    #[arg(long, value_name = "N")]
    pub max_values: Option<usize>,

    /// Regenerate even when the output is up to date
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub project: ProjectArgs,
}

pub fn run(args: GenerateArgs, config: Option<&Path>, printer: &Printer) -> Result<()> {
    let settings = args.project.settings(config, args.max_values)?;
    let pipeline = Pipeline::new(settings);

    match pipeline.generate(&args.input, &args.output, args.force)? {
        Outcome::UpToDate => {
            printer.status("Fresh", &display_path(&args.output));
        }
        Outcome::Generated { reason, buffers } => {
            if buffers.is_empty() {
                printer.warning(
                    "Warning",
                    &format!("no live declarations in {}", display_path(&args.input)),
                );
            }
            for buffer in &buffers {
                match &buffer.scheme {
                    Some(scheme) => printer.info(
                        "Compressed",
                        &format!(
                            "{} {} -> {} bytes {}",
                            buffer.name,
                            buffer.raw_len,
                            buffer.emitted_len,
                            printer.dim(&format!("({})", scheme))
                        ),
                    ),
                    None => printer.info(
                        "Packed",
                        &format!("{} {} bytes", buffer.name, buffer.raw_len),
                    ),
                }
            }

            let why = reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "forced".to_string());
            printer.status(
                "Generated",
                &format!(
                    "{} ({}, {})",
                    display_path(&args.output),
                    plural(buffers.len(), "buffer", "buffers"),
                    why
                ),
            );
        }
    }
    Ok(())
}
