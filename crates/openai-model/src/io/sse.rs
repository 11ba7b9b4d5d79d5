use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
pub struct Sse {
    buf: String,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain the events already buffered before reading more data.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                return Ok(None);
            };
            let Ok(s) = str::from_utf8(&bytes) else {
                return Err(Error::InvalidPayload);
            };
            self.buf.push_str(&s.replace("\r\n", "\n"));
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        // For `end-of-line`, we only handle line feed (CRLF is normalized
        // when buffering). Only `data` fields are kept, comments are skipped.
        //
        // event         = *( comment / field ) end-of-line
        // comment       = colon *any-char end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        loop {
            let Some(eol_idx) = self.buf.find("\n\n") else {
                return Ok(None);
            };

            let mut data_lines = vec![];
            for line in self.buf[0..eol_idx].lines() {
                if line.starts_with(':') {
                    continue;
                }
                let Some((name, value)) = line.split_once(':') else {
                    return Err(Error::InvalidPayload);
                };
                if name != "data" {
                    // Other fields are not supported.
                    return Err(Error::InvalidPayload);
                }
                data_lines.push(value.strip_prefix(' ').unwrap_or(value));
            }
            let data = data_lines.join("\n");
            let is_comment_only = data_lines.is_empty();

            // Consume the bytes from the buffer.
            self.buf.drain(0..eol_idx + 2);

            if !is_comment_only {
                return Ok(Some(data));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn test_normal_events() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: hello\n\ndata: bye\n\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quirk_streaming() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b": keep-alive\r\n\r\n"),
                Bytes::from_static(b"data:"),
                Bytes::from_static(b" hello\n"),
                Bytes::from_static(b"\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"xxxxxx\n\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"event: ping\n\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        // Incomplete events are dropped at the end of the stream.
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: hello\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap(), None);
    }
}
