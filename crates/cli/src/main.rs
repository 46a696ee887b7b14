use std::process::ExitCode;

fn main() -> ExitCode {
    dcx_cli::run()
}
