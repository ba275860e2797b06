//! Modbus-RTU CRC-16 (poly 0xA001, init 0xFFFF), little-endian on the wire.

/// Compute the CRC-16 of `buf` using the right-shift Modbus variant.
pub fn crc16(buf: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in buf {
        crc ^= b as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Verify that `frame`'s trailing two bytes are the little-endian CRC-16 of
/// everything before them. Frames shorter than 4 bytes never validate.
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < 4 {
        return false;
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    let want = crc16(body);
    let got = u16::from_le_bytes([tail[0], tail[1]]);
    want == got
}

/// Append the little-endian CRC-16 of `body` to it, returning a new frame.
pub fn append(body: &[u8]) -> Vec<u8> {
    let crc = crc16(body);
    let mut out = Vec::with_capacity(body.len() + 2);
    out.extend_from_slice(body);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}
