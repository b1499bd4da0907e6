fn main() {
    use clap::Parser;
    use std::error::Error;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = wnscrape::cli::Args::parse();
    if let Err(e) = wnscrape::cli::run(&args) {
        eprintln!("{}", e);
        let mut source = e.source();
        while let Some(s) = source {
            eprintln!("  cause: {}", s);
            source = s.source();
        }
        std::process::exit(e.exit_code());
    }
}
