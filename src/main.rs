use clap::Parser;
use zmw_ccs::{ccs, cli};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cli::Args::parse();

    if let Err(e) = ccs::run(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
