//! MBAP header codec and the MBAP↔RTU translation (C3 companion, §3/§4.6).

use crate::crc;

/// A decoded 7-byte MBAP header plus its trailing PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbapRequest {
    pub tid: u16,
    pub pid: u16,
    pub unit: u8,
    pub pdu: Vec<u8>,
}

/// Maximum MBAP `length` field this broker accepts: unit byte (1) plus the
/// Modbus PDU maximum of 253 bytes. Larger values close the connection
/// rather than allocating (resolves the base spec's Open Question on
/// unbounded `length`).
pub const MAX_MBAP_LENGTH: u16 = 254;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MbapError {
    #[error("mbap length {0} out of range [2, {MAX_MBAP_LENGTH}]")]
    LengthOutOfRange(u16),
}

impl MbapRequest {
    /// Parse the fixed 7-byte MBAP header. The caller is responsible for
    /// then reading exactly `length - 1` further bytes as `pdu`.
    pub fn parse_header(header: &[u8; 7]) -> Result<(u16, u16, u16, u8), MbapError> {
        let tid = u16::from_be_bytes([header[0], header[1]]);
        let pid = u16::from_be_bytes([header[2], header[3]]);
        let length = u16::from_be_bytes([header[4], header[5]]);
        let unit = header[6];
        if length < 2 || length > MAX_MBAP_LENGTH {
            return Err(MbapError::LengthOutOfRange(length));
        }
        Ok((tid, pid, length, unit))
    }

    /// Synthesize the downstream RTU request `unit ‖ pdu ‖ crc16(unit‖pdu)`.
    pub fn to_rtu_request(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(1 + self.pdu.len());
        body.push(self.unit);
        body.extend_from_slice(&self.pdu);
        crc::append(&body)
    }
}

/// Build the MBAP response frame `tid ‖ pid ‖ (len(pdu_out)+1) ‖ unit_out ‖ pdu_out`
/// from an RTU response frame, preserving the original `tid`/`pid` (I5).
pub fn rtu_response_to_mbap(tid: u16, pid: u16, rtu_response: &[u8]) -> Option<Vec<u8>> {
    if rtu_response.len() < 4 || !crc::verify(rtu_response) {
        return None;
    }
    let unit = rtu_response[0];
    let pdu = &rtu_response[2..rtu_response.len() - 2];
    let length = (pdu.len() + 1) as u16;

    let mut out = Vec::with_capacity(7 + pdu.len());
    out.extend_from_slice(&tid.to_be_bytes());
    out.extend_from_slice(&pid.to_be_bytes());
    out.extend_from_slice(&length.to_be_bytes());
    out.push(unit);
    out.extend_from_slice(pdu);
    Some(out)
}
