//! Binary primitives shared by every serializer in the crate: little-endian
//! fixed-width fields, `u32` length-prefixed blobs, and a CRC-32 checksum.
//!
//! Readers operate on a `Cursor<&[u8]>` and never read past its end; running
//! out of bytes is always a `PhiError::FormatError`.

use std::io::Cursor;

use crate::error::PhiError;

//==================================================================================
// 1. Fixed-Width Fields
//==================================================================================

/// Borrows the next `len` bytes from the cursor and advances it.
pub fn read_slice<'a>(
    cursor: &mut Cursor<&'a [u8]>,
    len: usize,
    what: &str,
) -> Result<&'a [u8], PhiError> {
    let data: &'a [u8] = *cursor.get_ref();
    let start = (cursor.position() as usize).min(data.len());
    let available = data.len() - start;
    if len > available {
        return Err(PhiError::truncated(what, len, available));
    }
    cursor.set_position((start + len) as u64);
    Ok(&data[start..start + len])
}

fn read_array<const N: usize>(
    cursor: &mut Cursor<&[u8]>,
    what: &str,
) -> Result<[u8; N], PhiError> {
    let mut buf = [0u8; N];
    buf.copy_from_slice(read_slice(cursor, N, what)?);
    Ok(buf)
}

pub fn read_u8(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<u8, PhiError> {
    Ok(read_array::<1>(cursor, what)?[0])
}

pub fn read_u16(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<u16, PhiError> {
    Ok(u16::from_le_bytes(read_array(cursor, what)?))
}

pub fn read_i16(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<i16, PhiError> {
    Ok(i16::from_le_bytes(read_array(cursor, what)?))
}

pub fn read_u32(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<u32, PhiError> {
    Ok(u32::from_le_bytes(read_array(cursor, what)?))
}

pub fn read_f32(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<f32, PhiError> {
    Ok(f32::from_le_bytes(read_array(cursor, what)?))
}

/// Converts a length to its `u32` wire form.
pub fn len_to_u32(len: usize, what: &str) -> Result<u32, PhiError> {
    u32::try_from(len).map_err(|_| {
        PhiError::UnsupportedInput(format!("{} of {} exceeds the u32 wire limit", what, len))
    })
}

//==================================================================================
// 2. Length-Prefixed Blobs
//==================================================================================

/// Writes a `u32` length followed by the bytes.
pub fn write_blob(buf: &mut Vec<u8>, data: &[u8]) -> Result<(), PhiError> {
    buf.extend_from_slice(&len_to_u32(data.len(), "blob length")?.to_le_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

/// Reads a blob written by `write_blob`, borrowing it from the underlying buffer.
pub fn read_blob<'a>(cursor: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], PhiError> {
    let len = read_u32(cursor, "blob length")? as usize;
    read_slice(cursor, len, "blob")
}

//==================================================================================
// 3. CRC-32 (IEEE 802.3)
//==================================================================================

/// CRC-32 lookup table.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = 0xEDB88320 ^ (crc >> 1);
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Calculate the CRC-32 checksum of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFF_u32;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = CRC32_TABLE[index] ^ (crc >> 8);
    }
    crc ^ 0xFFFFFFFF
}

pub fn verify_crc32(data: &[u8], expected: u32) -> bool {
    compute_crc32(data) == expected
}

//==================================================================================
// 4. Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_roundtrip_and_position() {
        let mut buf = Vec::new();
        write_blob(&mut buf, b"alpha").unwrap();
        write_blob(&mut buf, b"").unwrap();
        buf.push(7);

        let mut cursor = Cursor::new(buf.as_slice());
        assert_eq!(read_blob(&mut cursor).unwrap(), b"alpha");
        assert_eq!(read_blob(&mut cursor).unwrap(), b"");
        assert_eq!(read_u8(&mut cursor, "tail").unwrap(), 7);
    }

    #[test]
    fn test_truncated_blob_is_format_error() {
        let mut buf = Vec::new();
        write_blob(&mut buf, &[1, 2, 3, 4, 5, 6]).unwrap();
        buf.truncate(7);

        let mut cursor = Cursor::new(buf.as_slice());
        let err = read_blob(&mut cursor).unwrap_err();
        assert!(matches!(err, PhiError::FormatError(_)));
        assert!(err.to_string().contains("need 6 bytes, have 3"));

        let mut short = Cursor::new(&[1u8, 0][..]);
        assert!(matches!(read_blob(&mut short), Err(PhiError::FormatError(_))));
    }

    #[test]
    fn test_crc32_known_vector() {
        // Standard check value for "123456789".
        assert_eq!(compute_crc32(b"123456789"), 0xCBF43926);
        assert_eq!(compute_crc32(b""), 0);
        assert!(verify_crc32(b"123456789", 0xCBF43926));
        assert!(!verify_crc32(b"123456780", 0xCBF43926));
    }

    #[test]
    fn test_fixed_width_reads() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x5048u16.to_le_bytes());
        buf.extend_from_slice(&(-3i16).to_le_bytes());
        buf.extend_from_slice(&1.5f32.to_le_bytes());
        let mut cursor = Cursor::new(buf.as_slice());
        assert_eq!(read_u16(&mut cursor, "magic").unwrap(), 0x5048);
        assert_eq!(read_i16(&mut cursor, "dod").unwrap(), -3);
        assert_eq!(read_f32(&mut cursor, "min").unwrap(), 1.5);
        assert!(read_u32(&mut cursor, "past end").is_err());
    }
}
