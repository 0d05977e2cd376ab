pub mod completions;
pub mod decode;
pub mod deps;
pub mod filter;
pub mod generate;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::{Overrides, Settings};
use crate::error::{BufferError, Result};

/// bufproc - Compile buffer declarations into C++ headers
#[derive(Parser, Debug)]
#[command(name = "bufproc")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project manifest (default: ./bufproc.yaml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the files that contain live buffer declarations
    Filter(filter::FilterArgs),

    /// Print the data files a source depends on
    Deps(deps::DepsArgs),

    /// Generate the buffer header for a source file
    Generate(generate::GenerateArgs),

    /// Decode a compressed buffer container
    Decode(decode::DecodeArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Definitions and search paths shared by the build commands.
#[derive(Args, Debug, Default)]
pub struct ProjectArgs {
    /// Define a macro, as with the compiler's -D
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    pub define: Vec<String>,

    /// Undefine a macro, as with the compiler's -U
    #[arg(short = 'U', value_name = "NAME")]
    pub undefine: Vec<String>,

    /// Data search directory, searched before the manifest's
    #[arg(short = 'I', long = "search", value_name = "DIR")]
    pub search: Vec<PathBuf>,

    /// Worker threads
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,
}

impl ProjectArgs {
    /// Effective settings for this invocation.
    pub fn settings(&self, config: Option<&std::path::Path>, max_values: Option<usize>) -> Result<Settings> {
        let cwd = std::env::current_dir()?;
        let mut defines = self.define.clone();
        defines.extend(self.undefine.iter().map(|name| format!("-U{}", name)));

        if max_values == Some(0) {
            return Err(BufferError::Config {
                message: "--max-values must be at least 1".to_string(),
                help: None,
            });
        }

        let overrides = Overrides {
            defines,
            search: self.search.clone(),
            max_values,
            threads: self.threads,
        };
        Settings::load(config, &cwd, &overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_compiler_style_flags() {
        let cli = Cli::parse_from([
            "bufproc", "-vv", "deps", "assets.h", "-DFEATURE", "-DLEVEL=2", "-UDEBUG", "-I", "data",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Deps(args) => {
                assert_eq!(args.project.define, vec!["FEATURE", "LEVEL=2"]);
                assert_eq!(args.project.undefine, vec!["DEBUG"]);
                assert_eq!(args.project.search, vec![PathBuf::from("data")]);
            }
            other => panic!("Expected deps, got {:?}", other),
        }
    }
}
