use bufproc::cli::{Cli, Commands};
use bufproc::output::{init_logging, log_level, Printer};
use clap::Parser;
use miette::Result;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(log_level(cli.verbose, cli.quiet));
    let printer = Printer::new().quiet(cli.quiet);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Filter(args) => bufproc::cli::filter::run(args, config, &printer)?,
        Commands::Deps(args) => bufproc::cli::deps::run(args, config, &printer)?,
        Commands::Generate(args) => bufproc::cli::generate::run(args, config, &printer)?,
        Commands::Decode(args) => bufproc::cli::decode::run(args, config, &printer)?,
        Commands::Completions(args) => bufproc::cli::completions::run(args, config, &printer)?,
    }

    Ok(())
}
