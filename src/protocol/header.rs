use bincode::{
    Decode, Encode,
    config::{Configuration, Fixint, LittleEndian},
    decode_from_slice, encode_into_slice,
};

use super::{HEADER_LEN, MessageType, transport::TransportError};

/// Fixed prefix of every message on the wire.
///
/// Layout is `[type lo, type hi, len lo, len hi]`. The length is taken as-is;
/// checking it against an actual buffer is left to the caller.
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub struct Header {
    pub message_type: MessageType,
    pub length: u16,
}

fn config() -> Configuration<LittleEndian, Fixint> {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}

impl Header {
    pub fn new(message_type: MessageType, length: u16) -> Self {
        Self {
            message_type,
            length,
        }
    }

    pub fn encode(&self) -> Result<[u8; HEADER_LEN], TransportError> {
        let mut buf = [0u8; HEADER_LEN];
        encode_into_slice(*self, &mut buf, config())?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, TransportError> {
        let (header, _) = decode_from_slice(bytes, config())?;
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_little_endian() {
        let header = Header::new(MessageType(0x0102), 0x0304);
        assert_eq!(header.encode().unwrap(), [0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn decode_is_inverse_of_encode() {
        for (kind, len) in [(0, 0), (1, 8), (0xffff, 0xffff), (0x00ff, 0xff00)] {
            let header = Header::new(MessageType(kind), len);
            let bytes = header.encode().unwrap();
            assert_eq!(Header::decode(&bytes).unwrap(), header);
        }
    }

    #[test]
    fn decode_reads_raw_fields() {
        let header = Header::decode(&[0x01, 0x00, 0x08, 0x00]).unwrap();
        assert_eq!(header.message_type, MessageType::USER_START);
        assert_eq!(header.length, 8);
    }

    #[test]
    fn hello_header_is_all_zero() {
        let header = Header::new(MessageType::HELLO, 0);
        assert_eq!(header.encode().unwrap(), [0; HEADER_LEN]);
    }
}
