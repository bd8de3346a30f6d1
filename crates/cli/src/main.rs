use std::process::ExitCode;

fn main() -> ExitCode {
    policyplanner_cli::run()
}
