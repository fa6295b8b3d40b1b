use std::collections::BTreeMap;

use crate::http::request::HttpError;

// size of \r\n fixed as 2
const CRLF: &[u8] = b"\r\n";

/// A case-insensitive table of HTTP header fields.
///
/// Entries are keyed by the lower-cased field name, so lookups ignore case and iteration
/// yields fields sorted by that key. Each entry remembers the spelling of the name it was
/// first stored under, which is the spelling written back onto the wire.
///
/// Repeated fields are folded into one comma-joined value, mirroring the rule that a
/// field appearing several times is logically one list-valued field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, Field>);

#[derive(Clone, Debug, PartialEq, Eq)]
struct Field {
    name: String,
    value: String,
}

impl Headers {
    /// Returns an empty header table.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Retrieves the value of a field, ignoring the case of `name`.
    ///
    /// Returns None if the field is not present.
    ///
    /// # Examples
    /// ```
    /// let mut headers = httpwire::http::headers::Headers::new();
    /// headers.set("Drink", "milk");
    /// assert_eq!(headers.get("drink"), Some("milk"));
    /// assert_eq!(headers.get("food"), None);
    /// ```
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(|field| field.value.as_str())
    }

    /// Adds a value to a field, folding it into any existing value with `", "`.
    ///
    /// # Examples
    /// ```
    /// let mut headers = httpwire::http::headers::Headers::new();
    /// headers.set("drink", "milk");
    /// headers.set("Drink", "water");
    /// headers.set("food", "pizza");
    /// assert_eq!(headers.get("drink"), Some("milk, water"));
    /// assert_eq!(headers.get("food"), Some("pizza"));
    /// ```
    pub fn set(&mut self, name: impl Into<String>, value: impl AsRef<str>) {
        let name = name.into();
        let value = value.as_ref();

        if let Some(existing) = self.0.get_mut(&name.to_ascii_lowercase()) {
            existing.value.push_str(", ");
            existing.value.push_str(value);
        } else {
            self.0.insert(
                name.to_ascii_lowercase(),
                Field {
                    name,
                    value: value.to_owned(),
                },
            );
        }
    }

    /// Stores a value for a field, overwriting whatever was there before.
    ///
    /// Used for singleton fields such as `Content-Length`, which must never be folded.
    ///
    /// # Examples
    /// ```
    /// let mut headers = httpwire::http::headers::Headers::new();
    /// headers.set("content-length", "0");
    /// headers.replace("Content-Length", "12");
    /// assert_eq!(headers.get("content-length"), Some("12"));
    /// ```
    pub fn replace(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.0.insert(
            name.to_ascii_lowercase(),
            Field {
                name,
                value: value.into(),
            },
        );
    }

    /// Removes a field, returning its value if it was present.
    pub fn delete(&mut self, name: &str) -> Option<String> {
        self.0
            .remove(&name.to_ascii_lowercase())
            .map(|field| field.value)
    }

    /// Iterates over `(name, value)` pairs, sorted by lower-cased name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.0
            .values()
            .map(|field| (field.name.as_str(), field.value.as_str()))
    }

    /// Returns the number of distinct fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the table holds no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parses complete header lines from `data` into the table.
    ///
    /// Returns the number of bytes consumed and whether the blank line ending the header
    /// block was reached. Only whole CRLF-terminated lines are consumed, so a trailing
    /// partial line is left for the caller to hand back once more bytes have arrived.
    /// `(0, false)` means no complete line was available yet.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::MalformedHeaderField` for a line without a colon, with an empty
    /// field name or with whitespace between the name and the colon, and
    /// `HttpError::InvalidHeaderName` for a name that is not an RFC 9110 token.
    pub fn parse(&mut self, data: &[u8]) -> Result<(usize, bool), HttpError> {
        let mut consumed = 0;

        loop {
            let rest = &data[consumed..];
            let Some(idx) = find_crlf(rest) else {
                return Ok((consumed, false));
            };

            if idx == 0 {
                return Ok((consumed + CRLF.len(), true));
            }

            let (name, value) = parse_field_line(&rest[..idx])?;
            self.set(name, value);
            consumed += idx + CRLF.len();
        }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Returns the offset of the first CRLF in `data`.
pub(crate) fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(CRLF.len()).position(|window| window == CRLF)
}

fn parse_field_line(line: &[u8]) -> Result<(&str, String), HttpError> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(HttpError::MalformedHeaderField)?;
    let (name, value) = (&line[..colon], &line[colon + 1..]);

    // obs-fold and "Name : value" are both rejected
    if name.is_empty() || name.last().is_some_and(u8::is_ascii_whitespace) {
        return Err(HttpError::MalformedHeaderField);
    }

    if !is_token(name) {
        return Err(HttpError::InvalidHeaderName(
            String::from_utf8_lossy(name).into_owned(),
        ));
    }

    let name = std::str::from_utf8(name).map_err(|_| HttpError::InternalInvariantViolated)?;
    let value = String::from_utf8_lossy(value.trim_ascii()).into_owned();

    Ok((name, value))
}

/// Returns true if `bytes` is a non-empty RFC 9110 token.
pub(crate) fn is_token(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().copied().all(is_token_byte)
}

/// Helper method to determine whether the passed byte is a valid token character according to <https://www.rfc-editor.org/rfc/rfc9110#section-5.6.2>
const fn is_token_byte(b: u8) -> bool {
    if b.is_ascii_alphanumeric() {
        return true;
    }

    matches!(
        b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`'
            | b'|' | b'~'
    )
}
