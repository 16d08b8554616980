//! Framing of reconciliation messages on a byte stream.
//!
//! Each frame is a 4-byte big-endian payload length followed by the
//! CBOR encoding of one [`ReconMsg`].

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ReconError, Result};
use crate::messages::ReconMsg;

/// Largest accepted frame payload.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Encode a message as a complete frame.
pub fn encode(msg: &ReconMsg) -> Result<BytesMut> {
    let mut payload = Vec::new();
    ciborium::into_writer(msg, &mut payload).map_err(|e| ReconError::Codec(e.to_string()))?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ReconError::MessageTooLarge(payload.len()));
    }

    let mut frame = BytesMut::with_capacity(LEN_PREFIX + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(&payload);
    Ok(frame)
}

/// Decode a frame payload (without its length prefix).
pub fn decode(payload: &[u8]) -> Result<ReconMsg> {
    ciborium::from_reader(payload).map_err(|e| ReconError::Codec(e.to_string()))
}

/// Write one framed message.
pub async fn write_msg<W>(writer: &mut W, msg: &ReconMsg) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message.
///
/// End of stream before a length prefix is reported as [`ReconError::Closed`].
pub async fn read_msg<R>(reader: &mut R) -> Result<ReconMsg>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(ReconError::Closed),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_MESSAGE_SIZE {
        return Err(ReconError::MessageTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_core::{FieldElement, ZSet};

    fn sample_set() -> ZSet {
        [3, 17, 40000]
            .into_iter()
            .map(|n| FieldElement::new(65537, n))
            .collect()
    }

    #[test]
    fn test_frame_layout() {
        let frame = encode(&ReconMsg::Done).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - LEN_PREFIX);
        assert_eq!(decode(&frame[LEN_PREFIX..]).unwrap(), ReconMsg::Done);
    }

    #[test]
    fn test_garbage_payload_is_codec_error() {
        let result = decode(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(ReconError::Codec(_))));
    }

    /// CBOR for a `ReconRqstPoly` whose prefix has the given raw fields.
    fn poly_with_prefix(bits: u64, buf: Vec<u8>) -> Vec<u8> {
        use ciborium::value::Value;

        let prefix = Value::Map(vec![
            (Value::Text("bits".into()), Value::Integer(bits.into())),
            (
                Value::Text("buf".into()),
                Value::Array(buf.into_iter().map(|b| Value::Integer(b.into())).collect()),
            ),
        ]);
        let body = Value::Map(vec![
            (Value::Text("prefix".into()), prefix),
            (Value::Text("size".into()), Value::Integer(0u8.into())),
            (Value::Text("samples".into()), Value::Array(vec![])),
        ]);
        let msg = Value::Map(vec![(Value::Text("ReconRqstPoly".into()), body)]);

        let mut payload = Vec::new();
        ciborium::into_writer(&msg, &mut payload).unwrap();
        payload
    }

    #[test]
    fn test_malformed_prefix_is_codec_error() {
        let ok = decode(&poly_with_prefix(4, vec![0b1010_0000])).unwrap();
        assert!(matches!(
            ok,
            ReconMsg::ReconRqstPoly { ref prefix, .. } if prefix.to_string() == "1010"
        ));

        // Length claims two bytes that are not there.
        let result = decode(&poly_with_prefix(16, vec![]));
        assert!(matches!(result, Err(ReconError::Codec(_))));

        // Bits set past the declared length.
        let result = decode(&poly_with_prefix(4, vec![0b1010_0001]));
        assert!(matches!(result, Err(ReconError::Codec(_))));
    }

    #[tokio::test]
    async fn test_stream_carries_consecutive_frames() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let msgs = vec![
            ReconMsg::ReconRqstFull {
                prefix: "0110".parse().unwrap(),
                elements: sample_set(),
            },
            ReconMsg::SyncFail,
            ReconMsg::FullElements { zset: sample_set() },
        ];

        for msg in &msgs {
            write_msg(&mut a, msg).await.unwrap();
        }
        for msg in &msgs {
            assert_eq!(&read_msg(&mut b).await.unwrap(), msg);
        }
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        assert!(matches!(read_msg(&mut b).await, Err(ReconError::Closed)));
    }

    #[tokio::test]
    async fn test_oversized_prefix_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32((MAX_MESSAGE_SIZE + 1) as u32).await.unwrap();
        assert!(matches!(
            read_msg(&mut b).await,
            Err(ReconError::MessageTooLarge(_))
        ));
    }
}
