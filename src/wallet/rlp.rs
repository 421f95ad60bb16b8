//! Minimal RLP encoder for transaction signing payloads.

/// Encode a byte string.
pub fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        out.push(bytes[0]);
        return;
    }
    encode_header(out, 0x80, bytes.len());
    out.extend_from_slice(bytes);
}

/// Encode an unsigned integer as its minimal big-endian byte string.
pub fn encode_u64(out: &mut Vec<u8>, value: u64) {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    encode_bytes(out, &bytes[start..]);
}

fn encode_header(out: &mut Vec<u8>, offset: u8, len: usize) {
    if len <= 55 {
        out.push(offset + len as u8);
        return;
    }
    let len_bytes = (len as u64).to_be_bytes();
    let start = len_bytes.iter().position(|b| *b != 0).unwrap_or(len_bytes.len());
    out.push(offset + 55 + (len_bytes.len() - start) as u8);
    out.extend_from_slice(&len_bytes[start..]);
}

/// Builder for an RLP list. Items are appended in order and the list header is
/// written by [`RlpList::finish`].
#[derive(Debug, Default)]
pub struct RlpList {
    payload: Vec<u8>,
}

impl RlpList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        encode_bytes(&mut self.payload, bytes);
        self
    }

    pub fn append_u64(&mut self, value: u64) -> &mut Self {
        encode_u64(&mut self.payload, value);
        self
    }

    /// Append an already-encoded list.
    pub fn append_list(&mut self, list: RlpList) -> &mut Self {
        self.payload.extend_from_slice(&list.finish());
        self
    }

    pub fn append_empty_list(&mut self) -> &mut Self {
        self.payload.push(0xc0);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 9);
        encode_header(&mut out, 0xc0, self.payload.len());
        out.extend_from_slice(&self.payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(value: &[u8]) -> String {
        let mut out = Vec::new();
        encode_bytes(&mut out, value);
        hex::encode(out)
    }

    fn int(value: u64) -> String {
        let mut out = Vec::new();
        encode_u64(&mut out, value);
        hex::encode(out)
    }

    #[test]
    fn encodes_strings() {
        assert_eq!(bytes(b"dog"), "83646f67");
        assert_eq!(bytes(b""), "80");
        assert_eq!(bytes(&[0x0f]), "0f");
        assert_eq!(bytes(&[0x80]), "8180");
    }

    #[test]
    fn encodes_long_strings_with_length_prefix() {
        let text = b"Lorem ipsum dolor sit amet, consectetur adipisicing elit";
        let encoded = bytes(text);
        assert!(encoded.starts_with("b838"));
        assert_eq!(encoded.len(), (2 + text.len()) * 2);
    }

    #[test]
    fn encodes_integers() {
        assert_eq!(int(0), "80");
        assert_eq!(int(15), "0f");
        assert_eq!(int(1024), "820400");
    }

    #[test]
    fn encodes_lists() {
        let mut list = RlpList::new();
        list.append_bytes(b"cat").append_bytes(b"dog");
        assert_eq!(hex::encode(list.finish()), "c88363617483646f67");

        assert_eq!(hex::encode(RlpList::new().finish()), "c0");

        let mut nested = RlpList::new();
        nested.append_empty_list().append_list(RlpList::new());
        assert_eq!(hex::encode(nested.finish()), "c2c0c0");
    }
}
