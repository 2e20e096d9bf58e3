use reqwest::Url;

use crate::error::CoreError;

/// Validate the backend base URL and normalize it to have no trailing slash.
pub(super) fn parse_base_url(connection: &str) -> Result<String, CoreError> {
    let parsed = Url::parse(connection).map_err(|e| {
        CoreError::Config(format!(
            "invalid backend url `{connection}`: expected HTTP(S) URL ({e})"
        ))
    })?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CoreError::Config(format!(
                "unsupported backend url scheme `{other}`; expected http or https"
            )))
        }
    }
    if parsed.query().is_some() {
        return Err(CoreError::Config(format!(
            "backend url `{connection}` must not carry a query string"
        )));
    }

    Ok(connection.trim_end_matches('/').to_owned())
}

/// Join a base URL with a request path that starts with `/`.
pub(super) fn join_path(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
