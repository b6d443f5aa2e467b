//! FrameDecoder - チャンク列から `data: ` レコードを切り出す
//!
//! # 規則
//! - バイト列のまま `\n` で分割する（UTF-8 の多バイト文字がチャンク境界を跨いでもよい）
//! - 最後の改行より後ろは次回まで持ち越す
//! - 各行は trim してから prefix を確認し、prefix を取り除いて返す
//! - prefix のない行（空行、`event:` など）は捨てる
//! - ストリーム終端で残った断片は完成しないので捨てる

/// Prefix of a data record.
pub const DATA_PREFIX: &str = "data: ";

#[derive(Debug, Clone)]
pub struct FrameDecoder {
    prefix: String,
    /// Trailing fragment not yet terminated by a newline.
    carry: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_prefix(DATA_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            carry: Vec::new(),
        }
    }

    /// Feed one chunk; returns every record completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let Some(last_newline) = self.carry.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.carry.drain(..=last_newline).collect();
        complete
            .split(|b| *b == b'\n')
            .filter_map(|line| self.record(line))
            .collect()
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// End of stream: drop the unterminated fragment, returning its length.
    pub fn finish(&mut self) -> usize {
        let dropped = self.carry.len();
        self.carry.clear();
        dropped
    }

    fn record(&self, line: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(line);
        let line = text.trim();
        line.strip_prefix(self.prefix.as_str()).map(str::to_string)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = concat!(
        "data: {\"event\":\"step_start\",\"step\":\"retrieval\"}\n",
        "\n",
        "event: ping\n",
        "data: {\"event\":\"step_complete\",\"step\":\"retrieval\",\"note\":\"naïve ☃\"}\r\n",
        "\n",
        "data: {\"event\":\"workflow_complete\"}\n",
    );

    fn decode_all(chunks: &[&[u8]]) -> (Vec<String>, usize) {
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.feed(chunk));
        }
        (out, decoder.pending())
    }

    #[test]
    fn emits_only_prefixed_records_without_prefix() {
        let (records, pending) = decode_all(&[STREAM.as_bytes()]);
        assert_eq!(
            records,
            vec![
                "{\"event\":\"step_start\",\"step\":\"retrieval\"}",
                "{\"event\":\"step_complete\",\"step\":\"retrieval\",\"note\":\"naïve ☃\"}",
                "{\"event\":\"workflow_complete\"}",
            ]
        );
        assert_eq!(pending, 0);
    }

    #[test]
    fn any_two_way_split_yields_the_same_records() {
        let bytes = STREAM.as_bytes();
        let (whole, _) = decode_all(&[bytes]);

        // 多バイト文字の途中も含め、すべてのバイト境界で分割する
        for at in 0..=bytes.len() {
            let (head, tail) = bytes.split_at(at);
            let (split, pending) = decode_all(&[head, tail]);
            assert_eq!(split, whole, "split at byte {at}");
            assert_eq!(pending, 0);
        }
    }

    #[test]
    fn record_is_withheld_until_its_newline_arrives() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: {\"event\":").is_empty());
        assert!(decoder.feed(b"\"workflow_complete\"}").is_empty());
        assert_eq!(decoder.pending(), 35);

        let records = decoder.feed(b"\ndata: {\"ev");
        assert_eq!(records, vec!["{\"event\":\"workflow_complete\"}"]);
        assert_eq!(decoder.pending(), 10);
    }

    #[test]
    fn finish_discards_unterminated_fragment() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"data: {\"event\":\"step_start\"");
        assert_eq!(decoder.finish(), 27);
        assert_eq!(decoder.pending(), 0);
        assert!(decoder.feed(b"\n").is_empty());
    }

    #[test]
    fn custom_prefix() {
        let mut decoder = FrameDecoder::with_prefix("rec:");
        let records = decoder.feed(b"rec:{}\ndata: {}\n");
        assert_eq!(records, vec!["{}"]);
    }
}
