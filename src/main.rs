use clap::Parser;
use granville::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    granville::logging::init_logging(cli.verbose);
    run(cli)
}
