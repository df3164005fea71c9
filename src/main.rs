use std::process::ExitCode;

fn main() -> ExitCode {
    json_tests::cli::run()
}
