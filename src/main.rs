fn main() {
    #[cfg(feature = "cli")]
    rompatch::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("rompatch: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
