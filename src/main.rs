use clap::Parser;
use log::warn;
use snafu::ErrorCompat;

mod args;
mod replay;

fn main() {
    let args = args::Args::parse();
    if args.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let config_path = match args.config {
        Some(path) => path,
        None => {
            eprintln!("No session file provided. See --help for the available options.");
            std::process::exit(2);
        }
    };

    let res = replay::run_session(config_path, args.reference, args.out, args.seed);
    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
