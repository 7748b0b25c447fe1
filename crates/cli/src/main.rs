fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(error) = residency_sim::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
