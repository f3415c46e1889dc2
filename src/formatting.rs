use std::process::ExitCode;

use adshot_lib::CaptureError;
use serde::Serialize;

/// Exit code for a capture that was skipped as a recent duplicate.
pub const EXIT_THROTTLED: u8 = 3;
/// Exit code for configuration and runtime failures.
pub const EXIT_FAILURE: u8 = 2;

/// Print a JSON value on its own line.
pub fn write_json<T: Serialize>(body: &T) -> Result<(), serde_json::Error> {
    let content = serde_json::to_string(body)?;
    println!("{content}");
    Ok(())
}

pub fn exit_code_for(err: &CaptureError) -> u8 {
    if err.is_expected() {
        EXIT_THROTTLED
    } else {
        EXIT_FAILURE
    }
}

/// Render an error as a JSON payload on stdout and return the matching exit code.
pub fn render_error(err: CaptureError) -> ExitCode {
    let payload = err.to_payload();
    match serde_json::to_string(&payload) {
        Ok(content) => println!("{content}"),
        Err(_) => println!("{{\"expected\":{}}}", payload.expected),
    }
    eprintln!("Error: {err}");
    ExitCode::from(exit_code_for(&err))
}
