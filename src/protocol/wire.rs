//! Primitive reads and writes for the Kafka wire format.
//!
//! All integers are big-endian. Strings are a signed 16-bit length followed by
//! UTF-8 bytes (-1 encodes null); byte blobs use a signed 32-bit length; arrays
//! are a signed 32-bit element count followed by the elements.
//!
//! Every read checks `remaining()` before touching the buffer so a truncated
//! frame surfaces as `FrameError::Malformed` instead of a panic.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::protocol::FrameError;

fn ensure<B: Buf + ?Sized>(buf: &B, needed: usize, what: &str) -> Result<(), FrameError> {
    if buf.remaining() < needed {
        return Err(FrameError::Malformed(format!(
            "truncated {}: need {} bytes, have {}",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

pub fn read_i8<B: Buf + ?Sized>(buf: &mut B) -> Result<i8, FrameError> {
    ensure(buf, 1, "int8")?;
    Ok(buf.get_i8())
}

pub fn read_i16<B: Buf + ?Sized>(buf: &mut B) -> Result<i16, FrameError> {
    ensure(buf, 2, "int16")?;
    Ok(buf.get_i16())
}

pub fn read_i32<B: Buf + ?Sized>(buf: &mut B) -> Result<i32, FrameError> {
    ensure(buf, 4, "int32")?;
    Ok(buf.get_i32())
}

pub fn read_i64<B: Buf + ?Sized>(buf: &mut B) -> Result<i64, FrameError> {
    ensure(buf, 8, "int64")?;
    Ok(buf.get_i64())
}

/// Read a nullable string (length -1 encodes null).
pub fn read_nullable_string<B: Buf + ?Sized>(buf: &mut B) -> Result<Option<String>, FrameError> {
    let len = read_i16(buf)?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    ensure(buf, len, "string body")?;
    let raw = buf.copy_to_bytes(len);
    let s = String::from_utf8(raw.to_vec())
        .map_err(|_| FrameError::Malformed("string is not valid UTF-8".to_string()))?;
    Ok(Some(s))
}

/// Read a non-nullable string; a null marker is malformed here.
pub fn read_string<B: Buf + ?Sized>(buf: &mut B) -> Result<String, FrameError> {
    read_nullable_string(buf)?
        .ok_or_else(|| FrameError::Malformed("unexpected null string".to_string()))
}

/// Read a nullable byte blob (length -1 encodes null, mapped to empty).
pub fn read_bytes<B: Buf + ?Sized>(buf: &mut B) -> Result<Bytes, FrameError> {
    let len = read_i32(buf)?;
    if len < 0 {
        return Ok(Bytes::new());
    }
    let len = len as usize;
    ensure(buf, len, "bytes body")?;
    Ok(buf.copy_to_bytes(len))
}

/// Read an array header and collect elements via `read_elem`.
pub fn read_array<T>(
    buf: &mut dyn Buf,
    mut read_elem: impl FnMut(&mut dyn Buf) -> Result<T, FrameError>,
) -> Result<Vec<T>, FrameError> {
    let count = read_i32(buf)?;
    if count < 0 {
        return Ok(Vec::new());
    }
    // Each element is at least one byte; anything larger than the buffer
    // is a corrupt count.
    if count as usize > buf.remaining() {
        return Err(FrameError::Malformed(format!(
            "array count {} exceeds remaining frame bytes",
            count
        )));
    }
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(read_elem(&mut *buf)?);
    }
    Ok(out)
}

/// Write a nullable string. Lengths beyond the int16 range would encode as a
/// negative marker and corrupt the frame, so they are rejected.
pub fn write_nullable_string(buf: &mut BytesMut, value: Option<&str>) -> Result<(), FrameError> {
    match value {
        Some(s) => {
            if s.len() > i16::MAX as usize {
                return Err(FrameError::Malformed(format!(
                    "string length {} exceeds int16 range",
                    s.len()
                )));
            }
            buf.put_i16(s.len() as i16);
            buf.put_slice(s.as_bytes());
        }
        None => buf.put_i16(-1),
    }
    Ok(())
}

pub fn write_string(buf: &mut BytesMut, value: &str) -> Result<(), FrameError> {
    write_nullable_string(buf, Some(value))
}

pub fn write_bytes(buf: &mut BytesMut, value: &Bytes) -> Result<(), FrameError> {
    if value.len() > i32::MAX as usize {
        return Err(FrameError::Malformed(format!(
            "byte blob length {} exceeds int32 range",
            value.len()
        )));
    }
    buf.put_i32(value.len() as i32);
    buf.put_slice(value);
    Ok(())
}

pub fn write_array<T>(
    buf: &mut BytesMut,
    items: &[T],
    mut write_elem: impl FnMut(&mut BytesMut, &T) -> Result<(), FrameError>,
) -> Result<(), FrameError> {
    buf.put_i32(items.len() as i32);
    for item in items {
        write_elem(buf, item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullable_string_round_trip() {
        let mut buf = BytesMut::new();
        write_nullable_string(&mut buf, Some("client-1")).unwrap();
        write_nullable_string(&mut buf, None).unwrap();

        let mut rd = buf.freeze();
        assert_eq!(read_nullable_string(&mut rd).unwrap().as_deref(), Some("client-1"));
        assert_eq!(read_nullable_string(&mut rd).unwrap(), None);
    }

    #[test]
    fn string_beyond_int16_range_is_rejected() {
        let mut buf = BytesMut::new();
        let oversized = "x".repeat(i16::MAX as usize + 1);
        let err = write_string(&mut buf, &oversized).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
        // Nothing partial was written.
        assert!(buf.is_empty());
    }

    #[test]
    fn truncated_int_is_malformed() {
        let mut buf = Bytes::from_static(&[0x00]);
        let err = read_i32(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn corrupt_array_count_is_malformed() {
        let mut buf = BytesMut::new();
        buf.put_i32(1_000_000);
        let mut rd = buf.freeze();
        let err = read_array(&mut rd, |b| read_i16(b)).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn null_marker_for_required_string_is_malformed() {
        let mut buf = BytesMut::new();
        buf.put_i16(-1);
        let mut rd = buf.freeze();
        assert!(read_string(&mut rd).is_err());
    }
}
