use std::process;

use clap::Parser;

use hksym::interfaces::cli::{log_heading, setup_logger, Cli};
use hksym::interfaces::input::Input;
use hksym::interfaces::InputHandle;
use hksym::io::read_hksym_yaml;
use hksym::parallel::is_coordinator_process;

fn main() {
    #[cfg(feature = "mpi")]
    let _universe = mpi::initialize();

    let cli = Cli::parse();
    // Only the coordinator of an MPI job writes the log.
    if is_coordinator_process() {
        if let Err(err) = setup_logger(cli.output.as_deref(), cli.verbose) {
            eprintln!("Unable to set up logging: {err}");
            process::exit(1);
        }
        log_heading();
    }

    let result = read_hksym_yaml::<Input, _>(&cli.config).and_then(|input| input.handle());
    if let Err(err) = result {
        log::error!("{err:#}");
        process::exit(1);
    }
}
