mod cli;
mod commands;
mod env_loader;
mod error;
mod logging;
mod migrate;

fn main() {
    if let Err(err) = cli::run() {
        match error::classify(&err) {
            Some(kind) => eprintln!("error[{}]: {err:#}", kind.code()),
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}
