//! Shell completions generation.

use std::path::Path;

use clap::Args;
use clap_complete::Shell;

use crate::output::Printer;

/// Generate shell completions
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn run(args: CompletionsArgs, _config: Option<&Path>, _printer: &Printer) -> crate::error::Result<()> {
    let mut cmd = <super::Cli as clap::CommandFactory>::command();
    clap_complete::generate(args.shell, &mut cmd, "bufproc", &mut std::io::stdout());
    Ok(())
}
