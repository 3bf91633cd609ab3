//! Item properties added to a file after avif-serialize has muxed it
//!
//! The muxer writes no `colr` ICC profile and no `clap`, `irot` or `imir`.
//! These are appended to `ipco` and associated with the primary item in
//! `ipma`. Enclosing box sizes and `iloc` offsets past the insertion points
//! are patched to match.

use crate::error::{Error, Result};
use crate::image::{CleanAperture, ImageMirror, ImageRotation};
use whereat::at;

/// A property box for the primary item
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Property {
    IccProfile(Vec<u8>),
    CleanAperture(CleanAperture),
    Rotation(ImageRotation),
    Mirror(ImageMirror),
}

impl Property {
    /// Transformative properties must be understood by readers
    fn essential(&self) -> bool {
        !matches!(self, Property::IccProfile(_))
    }

    fn to_box(&self) -> Result<Vec<u8>> {
        let (typ, payload): (&[u8; 4], Vec<u8>) = match self {
            Property::IccProfile(icc) => {
                let mut payload = Vec::with_capacity(4 + icc.len());
                payload.extend_from_slice(b"prof");
                payload.extend_from_slice(icc);
                (b"colr", payload)
            }
            Property::CleanAperture(c) => {
                let fields = [
                    c.width_n,
                    c.width_d,
                    c.height_n,
                    c.height_d,
                    c.horiz_off_n as u32,
                    c.horiz_off_d,
                    c.vert_off_n as u32,
                    c.vert_off_d,
                ];
                (b"clap", fields.iter().flat_map(|v| v.to_be_bytes()).collect())
            }
            Property::Rotation(r) => (b"irot", vec![r.0 & 0x03]),
            Property::Mirror(m) => (b"imir", vec![m.0 & 0x01]),
        };
        let size = u32::try_from(8 + payload.len())
            .map_err(|_| at(Error::Encode("item property too large".into())))?;
        let mut out = Vec::with_capacity(size as usize);
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(typ);
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeField {
    Compact,
    Large,
    ToEnd,
}

#[derive(Debug, Clone, Copy)]
struct BoxRange {
    typ: [u8; 4],
    start: usize,
    size_field: SizeField,
    body: usize,
    end: usize,
}

fn malformed(what: &str) -> whereat::At<Error> {
    at(Error::Encode(format!("cannot add item properties: {what}")))
}

fn read_uint(data: &[u8], pos: usize, size: usize) -> Result<u64> {
    let bytes = data
        .get(pos..pos + size)
        .ok_or_else(|| malformed("truncated box"))?;
    Ok(bytes.iter().fold(0u64, |acc, &b| acc << 8 | b as u64))
}

fn write_uint(data: &mut [u8], pos: usize, size: usize, value: u64) -> Result<()> {
    if size < 8 && value >> (size * 8) != 0 {
        return Err(malformed("field overflow"));
    }
    let bytes = data
        .get_mut(pos..pos + size)
        .ok_or_else(|| malformed("truncated box"))?;
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = (value >> ((size - 1 - i) * 8)) as u8;
    }
    Ok(())
}

fn children(data: &[u8], mut pos: usize, end: usize) -> Result<Vec<BoxRange>> {
    let mut out = Vec::new();
    while pos < end {
        let typ: [u8; 4] = data
            .get(pos + 4..pos + 8)
            .and_then(|t| t.try_into().ok())
            .ok_or_else(|| malformed("truncated box header"))?;
        let (size_field, header, size) = match read_uint(data, pos, 4)? {
            0 => (SizeField::ToEnd, 8, (end - pos) as u64),
            1 => (SizeField::Large, 16, read_uint(data, pos + 8, 8)?),
            n => (SizeField::Compact, 8, n),
        };
        let box_end = usize::try_from(size)
            .ok()
            .and_then(|s| pos.checked_add(s))
            .filter(|&e| size >= header as u64 && e <= end)
            .ok_or_else(|| malformed("box size out of bounds"))?;
        out.push(BoxRange {
            typ,
            start: pos,
            size_field,
            body: pos + header,
            end: box_end,
        });
        pos = box_end;
    }
    Ok(out)
}

fn find<'a>(boxes: &'a [BoxRange], typ: &[u8; 4]) -> Result<&'a BoxRange> {
    boxes
        .iter()
        .find(|b| &b.typ == typ)
        .ok_or_else(|| malformed(&format!("no {} box", String::from_utf8_lossy(typ))))
}

fn grow(data: &mut [u8], b: &BoxRange, delta: u64) -> Result<()> {
    match b.size_field {
        SizeField::Compact => {
            let size = read_uint(data, b.start, 4)?;
            write_uint(data, b.start, 4, size + delta)
        }
        SizeField::Large => {
            let size = read_uint(data, b.start + 8, 8)?;
            write_uint(data, b.start + 8, 8, size + delta)
        }
        SizeField::ToEnd => Ok(()),
    }
}

/// Shift file offsets at or past `threshold` by `delta`
fn shift_iloc(data: &mut [u8], iloc: &BoxRange, threshold: u64, delta: u64) -> Result<()> {
    let version = read_uint(data, iloc.body, 1)?;
    let mut pos = iloc.body + 4;
    let sizes = read_uint(data, pos, 1)? as usize;
    let (offset_size, length_size) = (sizes >> 4, sizes & 0x0F);
    let sizes = read_uint(data, pos + 1, 1)? as usize;
    let base_offset_size = sizes >> 4;
    let index_size = if version == 1 || version == 2 {
        sizes & 0x0F
    } else {
        0
    };
    pos += 2;
    let id_size = if version < 2 { 2 } else { 4 };
    let item_count = read_uint(data, pos, id_size)?;
    pos += id_size;

    for _ in 0..item_count {
        pos += id_size;
        let construction_method = if version == 1 || version == 2 {
            let m = read_uint(data, pos, 2)? & 0x0F;
            pos += 2;
            m
        } else {
            0
        };
        // data_reference_index
        pos += 2;
        let base_pos = pos;
        let base = read_uint(data, pos, base_offset_size)?;
        pos += base_offset_size;
        let extent_count = read_uint(data, pos, 2)?;
        pos += 2;

        let in_file = construction_method == 0;
        let base_shifted = in_file && base_offset_size > 0 && base >= threshold;
        if base_shifted {
            write_uint(data, base_pos, base_offset_size, base + delta)?;
        }
        for _ in 0..extent_count {
            pos += index_size;
            let offset_pos = pos;
            let offset = read_uint(data, pos, offset_size)?;
            pos += offset_size + length_size;
            if in_file && !base_shifted && base + offset >= threshold {
                write_uint(data, offset_pos, offset_size, offset + delta)?;
            }
        }
    }
    Ok(())
}

/// Append `properties` to the primary item of a muxed AVIF file
pub(crate) fn add_item_properties(file: Vec<u8>, properties: &[Property]) -> Result<Vec<u8>> {
    if properties.is_empty() {
        return Ok(file);
    }
    let mut data = file;

    let top = children(&data, 0, data.len())?;
    let meta = *find(&top, b"meta")?;
    let meta_children = children(&data, meta.body + 4, meta.end)?;
    let pitm = find(&meta_children, b"pitm")?;
    let primary = match read_uint(&data, pitm.body, 1)? {
        0 => read_uint(&data, pitm.body + 4, 2)?,
        _ => read_uint(&data, pitm.body + 4, 4)?,
    };
    let iloc = *find(&meta_children, b"iloc")?;
    let iprp = *find(&meta_children, b"iprp")?;
    let iprp_children = children(&data, iprp.body, iprp.end)?;
    let ipco = *find(&iprp_children, b"ipco")?;
    let ipma = *find(&iprp_children, b"ipma")?;

    let first_index = children(&data, ipco.body, ipco.end)?.len() + 1;

    // Locate the primary item's association list
    let ipma_version = read_uint(&data, ipma.body, 1)?;
    let wide = read_uint(&data, ipma.body + 1, 3)? & 1 != 0;
    let id_size = if ipma_version < 1 { 2 } else { 4 };
    let entry_size = if wide { 2 } else { 1 };
    let mut pos = ipma.body + 4;
    let entry_count = read_uint(&data, pos, 4)?;
    pos += 4;
    let mut target = None;
    for _ in 0..entry_count {
        let id = read_uint(&data, pos, id_size)?;
        pos += id_size;
        let count = read_uint(&data, pos, 1)? as usize;
        let list_end = pos + 1 + count * entry_size;
        if id == primary {
            target = Some((pos, count, list_end));
        }
        pos = list_end;
    }
    let (count_pos, count, assoc_at) =
        target.ok_or_else(|| malformed("primary item has no property associations"))?;
    if count + properties.len() > 255 {
        return Err(malformed("too many property associations"));
    }

    let mut boxes = Vec::new();
    let mut assoc = Vec::new();
    for (i, property) in properties.iter().enumerate() {
        boxes.extend_from_slice(&property.to_box()?);
        let index = first_index + i;
        let essential = property.essential();
        if wide {
            if index > 0x7FFF {
                return Err(malformed("property index overflow"));
            }
            let v = (index as u16) | if essential { 0x8000 } else { 0 };
            assoc.extend_from_slice(&v.to_be_bytes());
        } else {
            if index > 0x7F {
                return Err(malformed("property index overflow"));
            }
            assoc.push((index as u8) | if essential { 0x80 } else { 0 });
        }
    }

    let total = (boxes.len() + assoc.len()) as u64;
    let threshold = ipco.end.min(assoc_at) as u64;
    shift_iloc(&mut data, &iloc, threshold, total)?;
    grow(&mut data, &meta, total)?;
    grow(&mut data, &iprp, total)?;
    grow(&mut data, &ipco, boxes.len() as u64)?;
    grow(&mut data, &ipma, assoc.len() as u64)?;
    data[count_pos] = (count + properties.len()) as u8;

    // Splice from the back so earlier positions stay valid
    let mut inserts = [(ipco.end, boxes), (assoc_at, assoc)];
    inserts.sort_by(|a, b| b.0.cmp(&a.0));
    for (at_pos, bytes) in inserts {
        let tail = data.split_off(at_pos);
        data.extend_from_slice(&bytes);
        data.extend_from_slice(&tail);
    }
    Ok(data)
}

/// Property boxes associated with the primary item, in association order
#[cfg(test)]
pub(crate) fn primary_properties(data: &[u8]) -> Result<Vec<([u8; 4], Vec<u8>)>> {
    let top = children(data, 0, data.len())?;
    let meta = find(&top, b"meta")?;
    let meta_children = children(data, meta.body + 4, meta.end)?;
    let pitm = find(&meta_children, b"pitm")?;
    let primary = read_uint(data, pitm.body + 4, 2)?;
    let iprp = find(&meta_children, b"iprp")?;
    let iprp_children = children(data, iprp.body, iprp.end)?;
    let ipco = find(&iprp_children, b"ipco")?;
    let ipma = find(&iprp_children, b"ipma")?;
    let props = children(data, ipco.body, ipco.end)?;

    let wide = read_uint(data, ipma.body + 1, 3)? & 1 != 0;
    let mut pos = ipma.body + 8;
    for _ in 0..read_uint(data, ipma.body + 4, 4)? {
        let id = read_uint(data, pos, 2)?;
        let count = read_uint(data, pos + 2, 1)? as usize;
        pos += 3;
        let mut out = Vec::new();
        for _ in 0..count {
            let (size, mask) = if wide { (2, 0x7FFF) } else { (1, 0x7F) };
            let index = (read_uint(data, pos, size)? & mask) as usize;
            pos += size;
            let b = index
                .checked_sub(1)
                .and_then(|i| props.get(i))
                .ok_or_else(|| malformed("dangling property index"))?;
            out.push((b.typ, data[b.body..b.end].to_vec()));
        }
        if id == primary {
            return Ok(out);
        }
    }
    Err(malformed("primary item has no property associations"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use avif_serialize::Aviffy;

    const COLOR: &[u8] = &[0xC0, 0x10, 0x12, 0x13, 0x14, 0x15];
    const ALPHA: &[u8] = &[0xA1, 0xA2, 0xA3];

    /// Payload offsets from `iloc`, as (item id, offset, length)
    fn extents(data: &[u8]) -> Vec<(u64, u64, u64)> {
        let top = children(data, 0, data.len()).unwrap();
        let meta = find(&top, b"meta").unwrap();
        let meta_children = children(data, meta.body + 4, meta.end).unwrap();
        let iloc = find(&meta_children, b"iloc").unwrap();
        let version = data[iloc.body];
        let offset_size = (data[iloc.body + 4] >> 4) as usize;
        let length_size = (data[iloc.body + 4] & 0x0F) as usize;
        let base_size = (data[iloc.body + 5] >> 4) as usize;
        assert!(version < 2);
        let mut pos = iloc.body + 6;
        let count = read_uint(data, pos, 2).unwrap();
        pos += 2;
        let mut out = Vec::new();
        for _ in 0..count {
            let id = read_uint(data, pos, 2).unwrap();
            pos += if version == 1 { 6 } else { 4 };
            let base = read_uint(data, pos, base_size).unwrap();
            pos += base_size;
            let extents = read_uint(data, pos, 2).unwrap();
            pos += 2;
            for _ in 0..extents {
                let offset = read_uint(data, pos, offset_size).unwrap();
                let length = read_uint(data, pos + offset_size, length_size).unwrap();
                pos += offset_size + length_size;
                out.push((id, base + offset, length));
            }
        }
        out
    }

    fn payload(data: &[u8], id: u64) -> Vec<u8> {
        let (_, offset, length) = extents(data)
            .into_iter()
            .find(|e| e.0 == id)
            .expect("item should have an extent");
        data[offset as usize..(offset + length) as usize].to_vec()
    }

    #[test]
    fn no_properties_leaves_file_untouched() {
        let file = Aviffy::new().to_vec(COLOR, None, 4, 2, 8);
        assert_eq!(add_item_properties(file.clone(), &[]).unwrap(), file);
    }

    #[test]
    fn properties_are_associated_and_payloads_still_resolve() {
        let file = Aviffy::new().to_vec(COLOR, Some(ALPHA), 4, 2, 8);
        let before = primary_properties(&file).unwrap().len();
        let icc = vec![7u8; 300];
        let clap = CleanAperture {
            width_n: 2,
            width_d: 1,
            height_n: 2,
            height_d: 1,
            horiz_off_n: -1,
            horiz_off_d: 2,
            vert_off_n: 0,
            vert_off_d: 1,
        };
        let out = add_item_properties(
            file.clone(),
            &[
                Property::IccProfile(icc.clone()),
                Property::CleanAperture(clap),
                Property::Rotation(ImageRotation(1)),
                Property::Mirror(ImageMirror(1)),
            ],
        )
        .unwrap();
        assert_eq!(out.len(), file.len() + 8 + 4 + 300 + 8 + 32 + 9 + 9 + 4);

        let props = primary_properties(&out).unwrap();
        assert_eq!(props.len(), before + 4);
        let added = &props[before..];
        assert_eq!(&added[0].0, b"colr");
        assert_eq!(&added[0].1[..4], b"prof");
        assert_eq!(&added[0].1[4..], &icc[..]);
        assert_eq!(&added[1].0, b"clap");
        assert_eq!(&added[1].1[16..20], &(-1i32).to_be_bytes());
        assert_eq!(added[2], (*b"irot", vec![1]));
        assert_eq!(added[3], (*b"imir", vec![1]));

        // 1 = primary color item, 2 = alpha
        assert_eq!(payload(&out, 1), COLOR);
        assert_eq!(payload(&out, 2), ALPHA);
        let top = children(&out, 0, out.len()).unwrap();
        assert_eq!(top.last().unwrap().end, out.len());
    }

    #[test]
    fn transformative_properties_are_essential() {
        let file = Aviffy::new().to_vec(COLOR, None, 4, 2, 8);
        let out = add_item_properties(
            file,
            &[
                Property::IccProfile(vec![1, 2, 3]),
                Property::Rotation(ImageRotation(2)),
            ],
        )
        .unwrap();
        let top = children(&out, 0, out.len()).unwrap();
        let meta = find(&top, b"meta").unwrap();
        let meta_children = children(&out, meta.body + 4, meta.end).unwrap();
        let iprp = find(&meta_children, b"iprp").unwrap();
        let ipma = *find(&children(&out, iprp.body, iprp.end).unwrap(), b"ipma").unwrap();
        // Last two association bytes of the single entry
        let tail = &out[ipma.end - 2..ipma.end];
        assert_eq!(tail[0] & 0x80, 0);
        assert_eq!(tail[1] & 0x80, 0x80);
    }

    #[test]
    fn truncated_file_is_an_error() {
        let file = Aviffy::new().to_vec(COLOR, None, 4, 2, 8);
        let cut = file[..file.len() / 2].to_vec();
        let err = add_item_properties(cut, &[Property::Mirror(ImageMirror(0))]).unwrap_err();
        assert!(matches!(err.into_inner(), Error::Encode(_)));
    }
}
