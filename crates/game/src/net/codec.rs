use super::packet::PacketError;

pub const NAME_LEN: usize = 32;

/// Bounds-checked little-endian reader over an untrusted payload.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], PacketError> {
        let end = self.pos.checked_add(N).ok_or(PacketError::Truncated {
            offset: self.pos,
            needed: N,
        })?;
        let bytes = self.buf.get(self.pos..end).ok_or(PacketError::Truncated {
            offset: self.pos,
            needed: N,
        })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos = end;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, PacketError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, PacketError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, PacketError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, PacketError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, PacketError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_name(&mut self) -> Result<String, PacketError> {
        Ok(decode_name(&self.read_array::<NAME_LEN>()?))
    }
}

#[inline]
pub fn put_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

#[inline]
pub fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn put_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn put_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn put_name(out: &mut Vec<u8>, name: &str) {
    out.extend_from_slice(&encode_name(name));
}

/// Packs a name into a NUL padded field. Text is cut at a char boundary so
/// at least one trailing NUL always remains.
pub fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut field = [0u8; NAME_LEN];
    let mut end = name.len().min(NAME_LEN - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    field[..end].copy_from_slice(&name.as_bytes()[..end]);
    field
}

pub fn decode_name(field: &[u8; NAME_LEN]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Strips control characters and surrounding whitespace from a player name.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        String::from("player")
    } else {
        decode_name(&encode_name(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_rejects_reads_past_end() {
        let mut reader = WireReader::new(&[1, 0, 0]);
        assert_eq!(reader.read_u16().unwrap(), 1);
        assert!(matches!(
            reader.read_u32(),
            Err(PacketError::Truncated { offset: 2, needed: 4 })
        ));
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut out = Vec::new();
        put_u32(&mut out, 0x0102_0304);
        assert_eq!(out, [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_name_truncates_on_char_boundary() {
        let long = "é".repeat(20);
        let field = encode_name(&long);
        assert_eq!(field[NAME_LEN - 1], 0);
        let decoded = decode_name(&field);
        assert_eq!(decoded.chars().count(), 15);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  Alice\n"), "Alice");
        assert_eq!(sanitize_name("\u{7}"), "player");
    }
}
