fn main() {
    if let Err(err) = qrkit_lib::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
