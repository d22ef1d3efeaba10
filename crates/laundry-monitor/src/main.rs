mod infra;
mod replay;
mod runtime;

fn main() {
    std::process::exit(runtime::run_from_args());
}
