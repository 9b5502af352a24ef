fn main() {
    if let Err(e) = instinct::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
