fn main() {
    if let Err(err) = stromtracker::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
