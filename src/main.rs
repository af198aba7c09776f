fn main() {
    if let Err(err) = sequin::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
