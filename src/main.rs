fn main() {
    #[cfg(feature = "cli")]
    gcdelta::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("gcdelta: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
