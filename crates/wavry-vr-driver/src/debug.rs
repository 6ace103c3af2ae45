//! Debug channel: request parsing and bounded response writing.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    Status,
    Stats,
    Views,
    Latency,
    Idr,
}

pub const UNKNOWN_REQUEST: &str = "error: unknown request";

impl DebugCommand {
    pub fn parse(request: &str) -> Option<Self> {
        let request = request.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        match request.to_ascii_lowercase().as_str() {
            "status" => Some(Self::Status),
            "stats" => Some(Self::Stats),
            "views" => Some(Self::Views),
            "latency" => Some(Self::Latency),
            "idr" => Some(Self::Idr),
            _ => None,
        }
    }
}

/// Copies `response` into `buf` as a NUL-terminated string, truncating on a
/// UTF-8 boundary. Returns the number of bytes written before the NUL.
pub fn write_response(buf: &mut [u8], response: &str) -> usize {
    let Some(room) = buf.len().checked_sub(1) else {
        return 0;
    };
    let mut len = response.len().min(room);
    while !response.is_char_boundary(len) {
        len -= 1;
    }
    buf[..len].copy_from_slice(&response.as_bytes()[..len]);
    buf[len] = 0;
    len
}
