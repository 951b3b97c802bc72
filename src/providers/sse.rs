//! Incremental Server-Sent Events parser
//!
//! Upstream bytes arrive in arbitrary pieces: one event may be split over
//! several reads and one read may carry several events. The parser keeps
//! the unfinished tail in a buffer and hands back the `data` payload of
//! every event completed so far.

use log::trace;

/// Stateful SSE parser that buffers incomplete events across reads
#[derive(Debug, Default)]
pub struct SseParser
{   buffer: String
  , /// Trailing bytes of a UTF-8 sequence cut by a read boundary
    pending: Vec<u8>
}

impl SseParser
{   pub fn new() -> Self
    {   SseParser
        {   buffer: String::new()
          , pending: Vec::new()
        }
    }

    /// Feed raw bytes from the wire
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Vec<String>
    {   self.pending.extend_from_slice(bytes);
        let decoded = match std::str::from_utf8(&self.pending)
        {   Ok(text) => {
              let text = text.to_string();
              self.pending.clear();
              text
            }
          , Err(e) if e.error_len().is_none() => {
              let valid = e.valid_up_to();
              let tail = self.pending.split_off(valid);
              let text = String::from_utf8_lossy(&self.pending)
                .into_owned();
              self.pending = tail;
              text
            }
          , Err(_) => {
              let text = String::from_utf8_lossy(&self.pending)
                .into_owned();
              self.pending.clear();
              text
            }
        };
        self.feed(&decoded)
    }

    /// Feed a piece of the stream and collect the completed payloads
    pub fn feed(&mut self, piece: &str) -> Vec<String>
    {   self.buffer.push_str(piece);
        // A trailing '\r' may be the first half of a "\r\n" pair.
        if self.buffer.contains('\r')
        {   let held_back = self.buffer.ends_with('\r');
            if held_back
            {   self.buffer.pop();
            }
            self.buffer = self.buffer
              .replace("\r\n", "\n")
              .replace('\r', "\n");
            if held_back
            {   self.buffer.push('\r');
            }
        }

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.find("\n\n")
        {   let event: String = self.buffer.drain(..end + 2).collect();
            if let Some(data) = Self::parse_event(&event)
            {   payloads.push(data);
            }
        }
        payloads
    }

    /// Flush whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String>
    {   let mut rest = std::mem::take(&mut self.buffer);
        rest.push_str(&String::from_utf8_lossy(&self.pending));
        self.pending.clear();
        Self::parse_event(rest.trim_end_matches('\r'))
    }

    fn parse_event(event: &str) -> Option<String>
    {   let mut data_lines: Vec<&str> = Vec::new();

        for line in event.lines()
        {   if line.is_empty() || line.starts_with(':')
            {   continue;
            }
            if let Some(data) = line.strip_prefix("data:")
            {   data_lines.push(data.strip_prefix(' ').unwrap_or(data));
            } else
            {   trace!("Ignoring SSE field: {}", line);
            }
        }

        if data_lines.is_empty()
        {   return None;
        }
        Some(data_lines.join("\n"))
    }
}
