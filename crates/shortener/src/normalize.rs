use url::Url;

use crate::store::ShortenError;

/// Accept `raw` if it parses as an absolute URL, otherwise retry with an `https://` prefix.
///
/// The accepted string is returned as given, not re-serialized.
pub fn normalize_url(raw: &str) -> Result<String, ShortenError> {
    if raw.is_empty() {
        return Err(ShortenError::MissingUrl);
    }

    if Url::parse(raw).is_ok() {
        return Ok(raw.to_string());
    }

    let prefixed = format!("https://{raw}");
    match Url::parse(&prefixed) {
        Ok(_) => Ok(prefixed),
        Err(_) => Err(ShortenError::InvalidUrl),
    }
}
