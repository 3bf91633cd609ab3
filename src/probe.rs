//! Format detection from the leading `ftyp` box

/// Bytes needed to decide
pub const PEEK_LEN: usize = 12;

const BRANDS: [&[u8; 4]; 2] = [b"avif", b"avis"];

/// True when `header` starts with an `ftyp` box whose major or a compatible
/// brand is `avif` or `avis`.
///
/// Compatible brands are read up to the declared box size or the end of
/// `header`, whichever comes first.
pub fn is_avif(header: &[u8]) -> bool {
    if header.len() < PEEK_LEN || &header[4..8] != b"ftyp" {
        return false;
    }
    let box_size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let end = if box_size >= PEEK_LEN {
        box_size.min(header.len())
    } else {
        header.len()
    };

    let major = &header[8..12];
    // Skip the 4-byte minor version between the major and compatible brands
    let compatible = header.get(16..end).unwrap_or(&[]).chunks_exact(4);
    std::iter::once(major)
        .chain(compatible)
        .any(|brand| BRANDS.iter().any(|b| brand == &b[..]))
}
