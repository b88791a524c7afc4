use std::process::ExitCode;

mod application;
mod logging;
mod presentation {
    pub mod cli;
}

fn main() -> ExitCode {
    match application::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rotguard: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
