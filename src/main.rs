mod channels;
mod cli;
mod data;
mod error;
mod geometry;
mod io;
mod pem;
mod rad;
mod rotation;
mod station;
mod tools;

use clap::Parser;

fn main() {
    std::process::exit(cli::main(cli::Args::parse()));
}
