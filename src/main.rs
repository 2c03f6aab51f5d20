fn main() {
    if let Err(err) = flowlayer::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
