//! RTU framing, parsing, and MBAP translation (C2, C3).

pub mod framer;
pub mod mbap;
pub mod parser;

pub use framer::Framer;
pub use parser::{parse, ParsedView};
