fn main() {
    if let Err(err) = solar_scope::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
