//! Just enough HTTP/1.x request-head parsing to route a request: method,
//! path and `Host`.

use brutal_core::normalize_path;
use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on the request line plus headers.
pub const MAX_HEAD_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Normalized path (decoded, slashes merged, dot segments resolved),
    /// without query or fragment.
    pub path: String,
    /// From an absolute-form target, else from the `Host` header.
    pub host: Option<String>,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("i/o error while reading request: {0}")]
    Io(#[from] std::io::Error),
    #[error("request head exceeds 8 KiB")]
    TooLarge,
    #[error("malformed request: {0}")]
    Malformed(&'static str),
}

/// Reads until a full head is buffered. `Ok(None)` means the peer closed the
/// connection without sending anything.
pub async fn read_head<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Option<RequestHead>, RequestError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(end) = find_head_end(buf) {
            let head = buf.split_to(end);
            return parse_head(&head).map(Some);
        }
        if buf.len() >= MAX_HEAD_LEN {
            return Err(RequestError::TooLarge);
        }

        buf.reserve(1024);
        if reader.read_buf(buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(RequestError::Malformed("connection closed mid-head"));
        }
    }
}

/// Offset just past the `\r\n\r\n` terminating the head.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

pub fn parse_head(head: &[u8]) -> Result<RequestHead, RequestError> {
    let text = std::str::from_utf8(head).map_err(|_| RequestError::Malformed("head is not UTF-8"))?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().ok_or(RequestError::Malformed("empty head"))?;
    let mut parts = request_line.split(' ');
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) if !m.is_empty() && !t.is_empty() => (m, t, v),
        _ => return Err(RequestError::Malformed("bad request line")),
    };
    if !version.starts_with("HTTP/1.") {
        return Err(RequestError::Malformed("unsupported HTTP version"));
    }

    let (target_host, path) = split_target(target)?;

    let mut header_host = None;
    for line in lines.take_while(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or(RequestError::Malformed("header without colon"))?;
        if name.eq_ignore_ascii_case("host") {
            if header_host.is_some() {
                return Err(RequestError::Malformed("duplicate Host header"));
            }
            header_host = Some(value.trim().to_string());
        }
    }

    Ok(RequestHead {
        method: method.to_string(),
        path,
        host: target_host.or(header_host).filter(|h| !h.is_empty()),
    })
}

fn split_target(target: &str) -> Result<(Option<String>, String), RequestError> {
    let normalize = |p: &str| -> Result<String, RequestError> {
        let end = p.find(|c: char| c == '?' || c == '#').unwrap_or(p.len());
        normalize_path(&p[..end]).ok_or(RequestError::Malformed("bad request path"))
    };

    if target == "*" {
        return Ok((None, "*".to_string()));
    }
    if target.starts_with('/') {
        return Ok((None, normalize(target)?));
    }

    let rest = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"))
        .ok_or(RequestError::Malformed("bad request target"))?;
    let (authority, path) = match rest.find('/') {
        Some(slash) => (&rest[..slash], normalize(&rest[slash..])?),
        None => (rest, "/".to_string()),
    };
    Ok((Some(authority.to_string()), path))
}
