//! Response heads and HTTP dates

use std::time::SystemTime;

use chrono::{DateTime, Utc};

/// Status line reason phrase
pub fn http_status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Status code and header fields of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Status code
    pub status: u16,
    /// Header fields in write order
    pub headers: Vec<(&'static str, String)>,
}

impl ResponseHead {
    /// Response with a `Date` header
    pub fn new(status: u16) -> Self {
        ResponseHead {
            status,
            headers: vec![("Date", http_date(SystemTime::now()))],
        }
    }

    /// Append a header field
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Value of a header field
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serialized status line and header block
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status,
            http_status_text(self.status)
        );
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.into_bytes()
    }
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
