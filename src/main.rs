fn main() {
    #[cfg(feature = "cli")]
    tardelta::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("tardelta: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
