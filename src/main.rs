use clap::Parser;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "AGENDA_LOG";

fn main() {
    init_tracing();

    let cli = agenda_share::Cli::parse();
    if let Err(err) = agenda_share::run(cli) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
