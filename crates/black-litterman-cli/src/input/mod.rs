pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Read a request from `--input <file.json>`, falling back to piped stdin.
pub fn read_request<T: DeserializeOwned>(
    path: Option<&str>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        file::read_json(path)
    } else if let Some(value) = stdin::read_stdin()? {
        Ok(value)
    } else {
        Err(format!("--input <file.json> or stdin required for {}", what).into())
    }
}
