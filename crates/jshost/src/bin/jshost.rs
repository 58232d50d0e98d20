use clap::{Parser, error::ErrorKind};
use jshost::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::DisplayVersion => {
            let _ = e.print();
            std::process::exit(0);
        }
        Err(e) => {
            // Help and usage errors both go to stderr and fail
            eprint!("{}", e.render().ansi());
            std::process::exit(1);
        }
    };

    std::process::exit(jshost::run_cli(&cli).await);
}
