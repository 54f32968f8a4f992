//! Session cookie handling.
//!
//! The service authenticates with exactly two cookies, so the jar is a plain
//! two-field struct rather than a generic store that may reorder or drop
//! attributes. `Set-Cookie` parsing is purpose-built for the same reason.

/// The `auth` / `twoFactorAuth` cookie pair sent on authenticated calls.
///
/// Either field may be empty at the pre-2FA stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    pub auth: String,
    pub two_factor: String,
}

impl CookieJar {
    pub fn new(auth: impl Into<String>, two_factor: impl Into<String>) -> Self {
        Self {
            auth: auth.into(),
            two_factor: two_factor.into(),
        }
    }

    /// `Cookie` header value; empty cookies are omitted.
    pub fn header_value(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if !self.auth.is_empty() {
            parts.push(format!("auth={}", self.auth));
        }
        if !self.two_factor.is_empty() {
            parts.push(format!("twoFactorAuth={}", self.two_factor));
        }
        parts.join("; ")
    }

    pub fn is_empty(&self) -> bool {
        self.auth.is_empty() && self.two_factor.is_empty()
    }
}

/// Splits a `Set-Cookie` header into `(name, value)` pairs.
///
/// Multiple cookies may arrive folded into one header joined with `,`. The
/// split happens only outside double-quoted values, and only where the text
/// after the comma starts a new `name=` pair — an `Expires` date also
/// contains a comma and must not be split. Attributes after the first `;`
/// of each cookie are dropped.
pub fn parse_set_cookie(header: &str) -> Vec<(String, String)> {
    let mut cookies = Vec::new();
    for part in split_cookies(header) {
        let pair = part.split(';').next().unwrap_or("");
        if let Some((name, value)) = pair.split_once('=') {
            let name = name.trim();
            if !name.is_empty() {
                cookies.push((name.to_string(), value.trim().trim_matches('"').to_string()));
            }
        }
    }
    cookies
}

fn split_cookies(header: &str) -> Vec<&str> {
    let bytes = header.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b',' if !in_quotes && starts_new_pair(&header[i + 1..]) => {
                parts.push(header[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(header[start..].trim());
    parts
}

/// A comma starts a new cookie only if what follows looks like `name=`.
fn starts_new_pair(rest: &str) -> bool {
    let rest = rest.trim_start();
    match rest.find('=') {
        Some(pos) if pos > 0 => !rest[..pos]
            .contains(|c: char| c.is_whitespace() || c == ';' || c == ','),
        _ => false,
    }
}
