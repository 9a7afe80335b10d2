//! Output formatting for the CLI.

use serde::Serialize;
use worklog_sessions::ApiResponse;

/// Prints `value` as one line of JSON.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: cannot render output: {}", e),
    }
}

/// Prints the response body and returns the process exit code.
pub fn print_response(response: &ApiResponse) -> i32 {
    print_json(&response.body);
    exit_code(response.status_code)
}

/// 0 for 2xx, 1 for client errors, 2 for server errors.
pub fn exit_code(status_code: u16) -> i32 {
    match status_code {
        200..=299 => 0,
        500..=599 => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_status_classes() {
        assert_eq!(exit_code(200), 0);
        assert_eq!(exit_code(201), 0);
        assert_eq!(exit_code(400), 1);
        assert_eq!(exit_code(404), 1);
        assert_eq!(exit_code(409), 1);
        assert_eq!(exit_code(503), 2);
    }
}
