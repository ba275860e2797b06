//! Decode a raw RTU frame into its addressable fields (C3).

/// Fields extracted from an RTU frame, present per function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParsedView {
    pub unit: u8,
    pub function: u8,
    pub body_len: usize,
    pub addr: Option<u16>,
    pub count: Option<u16>,
    pub value: Option<u16>,
    pub byte_count: Option<u8>,
}

/// Parse `frame` into a [`ParsedView`]. Frames shorter than 4 bytes yield the
/// default (all-zero) view. Unknown function codes yield only
/// `{unit, function, body_len}`.
pub fn parse(frame: &[u8]) -> ParsedView {
    if frame.len() < 4 {
        return ParsedView::default();
    }
    let unit = frame[0];
    let function = frame[1];
    let body = &frame[2..frame.len() - 2];
    let mut view = ParsedView {
        unit,
        function,
        body_len: body.len(),
        ..Default::default()
    };

    match function {
        3 | 4 if body.len() >= 4 => {
            view.addr = Some(u16::from_be_bytes([body[0], body[1]]));
            view.count = Some(u16::from_be_bytes([body[2], body[3]]));
        }
        6 if body.len() >= 4 => {
            view.addr = Some(u16::from_be_bytes([body[0], body[1]]));
            view.value = Some(u16::from_be_bytes([body[2], body[3]]));
        }
        16 if body.len() >= 5 => {
            view.addr = Some(u16::from_be_bytes([body[0], body[1]]));
            view.count = Some(u16::from_be_bytes([body[2], body[3]]));
            view.byte_count = Some(body[4]);
        }
        _ => {}
    }

    view
}
