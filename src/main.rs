use proxy_tunnel::probe::run_from_env;

fn main() {
    proxy_tunnel::logging::init_logging();
    match run_from_env() {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(_) => println!(
                "Connected to {} via {} in {}ms",
                report.target, report.strategy, report.elapsed_ms
            ),
        },
        Err(err) => {
            eprintln!("proxy probe failed: {err:#}");
            std::process::exit(1);
        }
    }
}
