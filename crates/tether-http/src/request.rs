//! Request head parsing
//!
//! Only the request line and header fields are parsed. Bodies are skipped by
//! the connection loop because the server answers GET and HEAD only.

use std::fmt;

use percent_encoding::percent_decode_str;

/// Largest request head a connection buffers before it is closed
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// HEAD
    Head,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// CONNECT
    Connect,
    /// OPTIONS
    Options,
    /// TRACE
    Trace,
}

impl Method {
    fn parse(s: &str) -> Option<Method> {
        match s {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            "CONNECT" => Some(Method::Connect),
            "OPTIONS" => Some(Method::Options),
            "TRACE" => Some(Method::Trace),
            _ => None,
        }
    }

    /// Method token
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP version of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// HTTP/1.0
    Http10,
    /// HTTP/1.1
    Http11,
}

/// Parsed request head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method
    pub method: Method,
    /// Percent-decoded path, query and fragment removed
    pub path: String,
    /// Protocol version
    pub version: Version,
    /// Header fields in arrival order
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// First value of a header (case-insensitive name)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Length of the body that follows the head.
    ///
    /// `None` when the body is not length-delimited (`Transfer-Encoding`) or
    /// `Content-Length` is invalid.
    pub fn body_length(&self) -> Option<u64> {
        if self.header("transfer-encoding").is_some() {
            return None;
        }
        match self.header("content-length") {
            Some(value) => value.parse().ok(),
            None => Some(0),
        }
    }

    /// Whether the client asked to keep the connection open
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("connection").map(str::to_ascii_lowercase);
        match self.version {
            Version::Http11 => connection.as_deref() != Some("close"),
            Version::Http10 => connection.as_deref() == Some("keep-alive"),
        }
    }
}

/// Offset just past the first `\r\n\r\n` in `buf`
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Parse a complete request head (including the blank line).
///
/// `None` means the head is malformed.
pub fn parse_head(head: &[u8]) -> Option<Request> {
    let text = std::str::from_utf8(head).ok()?;
    if !text.is_ascii() {
        return None;
    }
    let mut lines = text.split("\r\n");

    let request_line = lines.next()?;
    let fields: Vec<&str> = request_line.split(' ').collect();
    if fields.len() != 3 {
        return None;
    }
    let method = Method::parse(fields[0])?;
    let path = decode_path(fields[1])?;
    let version = match fields[2] {
        "HTTP/1.0" => Version::Http10,
        "HTTP/1.1" => Version::Http11,
        _ => return None,
    };

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':')?;
        if name.is_empty() || name.contains([' ', '\t']) {
            return None;
        }
        headers.push((name.to_string(), value.trim_matches([' ', '\t']).to_string()));
    }

    Some(Request {
        method,
        path,
        version,
        headers,
    })
}

/// Extract and percent-decode the path of a request target
fn decode_path(target: &str) -> Option<String> {
    // Absolute-form targets carry a scheme and authority before the path
    let target = match target.find("://") {
        Some(scheme_end) => {
            let rest = &target[scheme_end + 3..];
            &rest[rest.find('/').unwrap_or(rest.len())..]
        }
        None => target,
    };
    let path = target.split(['?', '#']).next().unwrap_or("");
    let path = if path.is_empty() { "/" } else { path };
    if !path.starts_with('/') {
        return None;
    }

    percent_decode_str(path)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_head_end() {
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r\nrest"), Some(18));
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\nHost: x\r\n"), None);
    }

    #[test]
    fn test_parse_simple_get() {
        let req = parse_head(b"GET /index.html?v=2 HTTP/1.1\r\nHost: localhost\r\nX-Empty:\r\n\r\n")
            .unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.version, Version::Http11);
        assert_eq!(req.header("host"), Some("localhost"));
        assert_eq!(req.header("x-empty"), Some(""));
        assert!(req.keep_alive());
    }

    #[test]
    fn test_percent_decoding() {
        let req = parse_head(b"HEAD /my%20file.txt HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(req.path, "/my file.txt");
        assert!(!req.keep_alive());
        // Stray percent signs are kept, invalid UTF-8 is rejected
        assert_eq!(parse_head(b"GET /100%zz HTTP/1.1\r\n\r\n").unwrap().path, "/100%zz");
        assert!(parse_head(b"GET /bad%ff HTTP/1.1\r\n\r\n").is_none());
    }

    #[test]
    fn test_absolute_form_target() {
        let req = parse_head(b"GET http://127.0.0.1:8080/a/b HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.path, "/a/b");
    }

    #[test]
    fn test_malformed_heads() {
        assert!(parse_head(b"GET /\r\n\r\n").is_none());
        assert!(parse_head(b"FETCH / HTTP/1.1\r\n\r\n").is_none());
        assert!(parse_head(b"GET / HTTP/2.0\r\n\r\n").is_none());
        assert!(parse_head(b"GET / HTTP/1.1\r\nNoColon\r\n\r\n").is_none());
        assert!(parse_head(b"GET  / HTTP/1.1\r\n\r\n").is_none());
    }

    #[test]
    fn test_connection_header() {
        let req = parse_head(b"GET / HTTP/1.1\r\nConnection: Close\r\n\r\n").unwrap();
        assert!(!req.keep_alive());
        let req = parse_head(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n").unwrap();
        assert!(req.keep_alive());
    }

    #[test]
    fn test_body_length() {
        let req = parse_head(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.body_length(), Some(0));
        let req = parse_head(b"POST / HTTP/1.1\r\nContent-Length: 12\r\n\r\n").unwrap();
        assert_eq!(req.body_length(), Some(12));
        let req = parse_head(b"POST / HTTP/1.1\r\nContent-Length: twelve\r\n\r\n").unwrap();
        assert_eq!(req.body_length(), None);
        let req = parse_head(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n").unwrap();
        assert_eq!(req.body_length(), None);
    }

    #[test]
    fn test_other_methods_parse() {
        let req = parse_head(b"POST /form HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.method, Method::Post);
    }
}
