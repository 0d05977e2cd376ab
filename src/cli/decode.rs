//! Decode command implementation.
//!
//! Reads a container written by the codec and reports what it holds.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;

use crate::codec::decode_container;
use crate::error::{BufferError, Result};
use crate::output::{display_path, Printer};

/// Decode a compressed buffer container
#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Binary container file
    pub file: PathBuf,

    /// Write the decoded bytes here
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub fn run(args: DecodeArgs, _config: Option<&Path>, printer: &Printer) -> Result<()> {
    let data = fs::read(&args.file).map_err(|e| BufferError::Io {
        path: args.file.clone(),
        message: format!("Failed to read container: {}", e),
    })?;
    let (params, decoded) = decode_container(&data)?;

    printer.info("Scheme", &params.to_string());
    printer.info(
        "Decoded",
        &format!("{} bytes -> {} bytes", data.len(), decoded.len()),
    );

    if let Some(output) = &args.output {
        fs::write(output, &decoded).map_err(|e| BufferError::Io {
            path: output.clone(),
            message: format!("Failed to write decoded data: {}", e),
        })?;
        printer.status("Wrote", &display_path(output));
    }
    Ok(())
}
