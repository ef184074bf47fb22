fn main() {
    if let Err(e) = reelshelf_lib::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
