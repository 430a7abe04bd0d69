//! Canonical hex dump of relayed buffers.

use std::fmt::Write;

const BYTES_PER_LINE: usize = 16;

/// Render `data` as a 16-bytes-per-line hex dump with an ASCII gutter.
///
/// ```text
/// 00000000  50 49 4e 47                                       |PING|
/// ```
///
/// Every line, including the last, ends with a newline. Empty input yields
/// an empty string.
pub fn dump(data: &[u8]) -> String {
    let lines = data.len().div_ceil(BYTES_PER_LINE);
    let mut out = String::with_capacity(lines * 79);

    for (line, chunk) in data.chunks(BYTES_PER_LINE).enumerate() {
        let _ = write!(out, "{:08x}  ", line * BYTES_PER_LINE);
        for i in 0..BYTES_PER_LINE {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, "{:02x} ", b);
                }
                None => out.push_str("   "),
            }
            if i == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        out.extend(chunk.iter().map(|&b| printable(b)));
        out.push_str("|\n");
    }

    out
}

fn printable(b: u8) -> char {
    if (32..=126).contains(&b) {
        b as char
    } else {
        '.'
    }
}
