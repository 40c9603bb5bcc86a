//! Main entry point for the cabforge CLI app

fn main() -> std::process::ExitCode {
    match cabforge::cli_runner::run_cli_app() {
        Ok(0) => std::process::ExitCode::SUCCESS,
        Ok(status) => std::process::ExitCode::from(status.clamp(1, 255) as u8),
        Err(e) => {
            if e.downcast_ref::<clap::Error>().is_none() {
                eprintln!("Error: {}", e);
            }
            std::process::ExitCode::FAILURE
        }
    }
}
