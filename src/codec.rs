//
// codec.rs
// dicom-components
//
// Byte-exact DICOM Part 10 reader and writer. Sequences and encapsulated pixel data are walked
// to find their end but kept as opaque bytes, so writing back what was read reproduces the file.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use dicom::core::{Tag, VR};
use tracing::warn;

use crate::dataset::{has_long_length, vr_code, ByteOrder, DataElement, DataSet, ElementValue, FileMetaInfo};
use crate::error::{Error, Result};
use crate::syntax::Encoding;
use crate::tags::{self, format_tag};

pub const PREAMBLE_LEN: usize = 128;
pub const MAGIC: &[u8; 4] = b"DICM";
pub const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;
/// Deepest sequence nesting the reader walks before calling the file corrupt.
pub const MAX_SEQUENCE_DEPTH: usize = 64;

/// The top-level Pixel Data element, kept apart from the rest of the data set.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelElement {
    pub vr: VR,
    /// Native pixels, or the fragment stream without its closing delimiter.
    pub bytes: Vec<u8>,
    pub undefined_length: bool,
}

/// Where a top-level element sits in the file and how many bytes it takes.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSpan {
    pub tag: Tag,
    pub vr: VR,
    pub offset: usize,
    pub header_len: usize,
    /// Value bytes, including the closing delimiter of undefined-length values.
    pub value_len: usize,
}

impl ElementSpan {
    pub fn encoded_len(&self) -> usize {
        self.header_len + self.value_len
    }
}

#[derive(Debug, Clone)]
pub struct Part10File {
    pub path: PathBuf,
    pub file_size: u64,
    pub preamble: [u8; PREAMBLE_LEN],
    pub meta: FileMetaInfo,
    pub transfer_syntax_uid: String,
    pub encoding: Encoding,
    pub dataset: DataSet,
    pub pixel: Option<PixelElement>,
    /// Offset of the Pixel Data value in the file.
    pub pixel_offset: Option<u64>,
    pub layout: Vec<ElementSpan>,
}

pub fn read_file(path: &Path) -> Result<Part10File> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    parse(&bytes, path)
}

/// Parse a complete Part 10 file held in memory. `path` is only used in errors.
pub fn parse(buf: &[u8], path: &Path) -> Result<Part10File> {
    if buf.len() < PREAMBLE_LEN + MAGIC.len() || &buf[PREAMBLE_LEN..PREAMBLE_LEN + 4] != MAGIC {
        return Err(Error::NotADicomFile {
            path: path.to_path_buf(),
            reason: "no \"DICM\" magic after the 128-byte preamble".into(),
        });
    }
    let mut preamble = [0u8; PREAMBLE_LEN];
    preamble.copy_from_slice(&buf[..PREAMBLE_LEN]);

    let mut walker = Walker {
        buf,
        pos: PREAMBLE_LEN + MAGIC.len(),
        path,
    };
    let mut layout = Vec::new();

    let mut meta_set = DataSet::new();
    while walker.peek_tag(ByteOrder::Little).map(|t| t.group()) == Some(0x0002) {
        let offset = walker.pos;
        let header = walker.read_header(Encoding::EXPLICIT_LE)?;
        if header.length == UNDEFINED_LENGTH {
            return Err(walker.corrupt(header.tag, "undefined length in File Meta group"));
        }
        let value = walker.bytes(header.length as usize, header.tag)?;
        layout.push(ElementSpan {
            tag: header.tag,
            vr: header.vr,
            offset,
            header_len: header.header_len,
            value_len: value.len(),
        });
        // Group length is recomputed whenever the group is written.
        if header.tag != tags::FILE_META_GROUP_LENGTH {
            meta_set.insert(DataElement::new(
                header.tag,
                header.vr,
                ElementValue::decode(header.vr, value, ByteOrder::Little),
            ));
        }
    }
    if meta_set.is_empty() {
        return Err(Error::NotADicomFile {
            path: path.to_path_buf(),
            reason: "File Meta group (0002,xxxx) is absent".into(),
        });
    }
    let meta = FileMetaInfo::from_dataset(meta_set);
    let transfer_syntax_uid = meta
        .transfer_syntax_uid()
        .ok_or_else(|| Error::MissingRequiredTag {
            path: path.to_path_buf(),
            tag: format_tag(tags::TRANSFER_SYNTAX_UID),
            name: "TransferSyntaxUID",
        })?
        .to_string();
    let encoding =
        Encoding::for_transfer_syntax(&transfer_syntax_uid).ok_or_else(|| {
            Error::UnsupportedTransferSyntax {
                path: path.to_path_buf(),
                uid: transfer_syntax_uid.clone(),
            }
        })?;

    let mut dataset = DataSet::new();
    let mut pixel = None;
    let mut pixel_offset = None;
    let mut previous: Option<Tag> = None;
    while walker.pos < buf.len() {
        let offset = walker.pos;
        let header = walker.read_header(encoding)?;
        if header.tag.group() == 0xFFFE || header.tag.group() == 0x0002 {
            return Err(walker.corrupt(header.tag, "element not allowed at data set level"));
        }
        if let Some(prev) = previous {
            if header.tag == prev {
                return Err(walker.corrupt(header.tag, "duplicate data element"));
            }
            if header.tag < prev {
                warn!(file = %path.display(), tag = %format_tag(header.tag), "data element out of ascending order");
            }
        }
        previous = Some(header.tag);

        let value_start = walker.pos;
        let delimiter = walker.skip_value(&header, encoding, 0)?;
        let value = &buf[value_start..delimiter.unwrap_or(walker.pos)];
        let undefined_length = header.length == UNDEFINED_LENGTH;
        layout.push(ElementSpan {
            tag: header.tag,
            vr: header.vr,
            offset,
            header_len: header.header_len,
            value_len: walker.pos - value_start,
        });

        if header.tag == tags::PIXEL_DATA {
            pixel = Some(PixelElement {
                vr: header.vr,
                bytes: value.to_vec(),
                undefined_length,
            });
            pixel_offset = Some(value_start as u64);
        } else {
            let value = if undefined_length {
                ElementValue::Bytes(value.to_vec())
            } else {
                ElementValue::decode(header.vr, value, encoding.byte_order)
            };
            dataset.insert(DataElement {
                tag: header.tag,
                vr: header.vr,
                value,
                undefined_length,
            });
        }
    }

    Ok(Part10File {
        path: path.to_path_buf(),
        file_size: buf.len() as u64,
        preamble,
        meta,
        transfer_syntax_uid,
        encoding,
        dataset,
        pixel,
        pixel_offset,
        layout,
    })
}

struct Header {
    tag: Tag,
    vr: VR,
    length: u32,
    header_len: usize,
}

struct Walker<'a> {
    buf: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> Walker<'a> {
    fn corrupt(&self, tag: Tag, reason: impl Into<String>) -> Error {
        Error::CorruptHeader {
            path: self.path.to_path_buf(),
            element: format!("{} offset {}", format_tag(tag), self.pos),
            reason: reason.into(),
        }
    }

    fn bytes(&mut self, n: usize, owner: Tag) -> Result<&'a [u8]> {
        let left = self.buf.len() - self.pos;
        if n > left {
            return Err(self.corrupt(
                owner,
                format!("needs {} bytes but only {} remain", n, left),
            ));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u16(&mut self, order: ByteOrder, owner: Tag) -> Result<u16> {
        let b = self.bytes(2, owner)?;
        Ok(order.read_u16([b[0], b[1]]))
    }

    fn u32(&mut self, order: ByteOrder, owner: Tag) -> Result<u32> {
        let b = self.bytes(4, owner)?;
        Ok(order.read_u32([b[0], b[1], b[2], b[3]]))
    }

    fn peek_tag(&self, order: ByteOrder) -> Option<Tag> {
        let b = self.buf.get(self.pos..self.pos + 4)?;
        Some(Tag(
            order.read_u16([b[0], b[1]]),
            order.read_u16([b[2], b[3]]),
        ))
    }

    fn read_tag(&mut self, order: ByteOrder, owner: Tag) -> Result<Tag> {
        let group = self.u16(order, owner)?;
        let element = self.u16(order, owner)?;
        Ok(Tag(group, element))
    }

    fn read_header(&mut self, enc: Encoding) -> Result<Header> {
        let start = self.pos;
        let tag = self.read_tag(enc.byte_order, Tag(0xFFFF, 0xFFFF))?;
        // Items and delimiters never carry a VR.
        if tag.group() == 0xFFFE {
            let length = self.u32(enc.byte_order, tag)?;
            return Ok(Header {
                tag,
                vr: VR::UN,
                length,
                header_len: self.pos - start,
            });
        }
        let (vr, length) = if enc.explicit_vr {
            let code = self.bytes(2, tag)?;
            let vr = VR::from_binary([code[0], code[1]]).ok_or_else(|| {
                self.corrupt(
                    tag,
                    format!("invalid VR bytes {:02X}{:02X}", code[0], code[1]),
                )
            })?;
            let length = if has_long_length(vr) {
                let reserved = self.bytes(2, tag)?;
                if reserved != [0, 0] {
                    warn!(
                        file = %self.path.display(),
                        tag = %format_tag(tag),
                        "non-zero reserved bytes in element header are written back as zero"
                    );
                }
                self.u32(enc.byte_order, tag)?
            } else {
                self.u16(enc.byte_order, tag)? as u32
            };
            (vr, length)
        } else {
            (tags::implicit_vr(tag), self.u32(enc.byte_order, tag)?)
        };
        Ok(Header {
            tag,
            vr,
            length,
            header_len: self.pos - start,
        })
    }

    /// Consume a value. For undefined lengths, returns where the closing delimiter starts.
    fn skip_value(&mut self, header: &Header, enc: Encoding, depth: usize) -> Result<Option<usize>> {
        if header.length != UNDEFINED_LENGTH {
            self.bytes(header.length as usize, header.tag)?;
            return Ok(None);
        }
        let nested = match header.vr {
            VR::SQ => enc,
            // An undefined-length UN holds an implicit VR little endian sequence.
            VR::UN => Encoding::IMPLICIT_LE,
            VR::OB | VR::OW if header.tag == tags::PIXEL_DATA => enc,
            _ => {
                return Err(self.corrupt(
                    header.tag,
                    format!("undefined length on a {} element", vr_code(header.vr)),
                ))
            }
        };
        if depth >= MAX_SEQUENCE_DEPTH {
            return Err(self.corrupt(
                header.tag,
                format!("sequences nested deeper than {} levels", MAX_SEQUENCE_DEPTH),
            ));
        }
        self.skip_items(nested, header.tag, depth + 1).map(Some)
    }

    /// Consume items through the sequence delimiter.
    fn skip_items(&mut self, enc: Encoding, owner: Tag, depth: usize) -> Result<usize> {
        loop {
            let item_start = self.pos;
            let tag = self.read_tag(enc.byte_order, owner)?;
            let length = self.u32(enc.byte_order, owner)?;
            if tag == tags::SEQUENCE_DELIMITATION {
                return Ok(item_start);
            }
            if tag != tags::ITEM {
                return Err(self.corrupt(
                    owner,
                    format!("unexpected {} inside sequence", format_tag(tag)),
                ));
            }
            if length == UNDEFINED_LENGTH {
                self.skip_item_elements(enc, owner, depth)?;
            } else {
                self.bytes(length as usize, owner)?;
            }
        }
    }

    fn skip_item_elements(&mut self, enc: Encoding, owner: Tag, depth: usize) -> Result<()> {
        loop {
            if self.peek_tag(enc.byte_order) == Some(tags::ITEM_DELIMITATION) {
                self.bytes(8, owner)?;
                return Ok(());
            }
            let header = self.read_header(enc)?;
            if header.tag.group() == 0xFFFE {
                return Err(self.corrupt(
                    owner,
                    format!("unexpected {} inside item", format_tag(header.tag)),
                ));
            }
            self.skip_value(&header, enc, depth)?;
        }
    }

    /// Read one element inside an item, keeping nested sequences as raw bytes.
    fn read_item_element(&mut self, enc: Encoding, depth: usize) -> Result<DataElement> {
        let header = self.read_header(enc)?;
        if header.tag.group() == 0xFFFE {
            return Err(self.corrupt(
                header.tag,
                format!("unexpected {} inside item", format_tag(header.tag)),
            ));
        }
        let start = self.pos;
        let delimiter = self.skip_value(&header, enc, depth)?;
        let buf = self.buf;
        let raw = &buf[start..delimiter.unwrap_or(self.pos)];
        let undefined_length = header.length == UNDEFINED_LENGTH;
        let value = if undefined_length {
            ElementValue::Bytes(raw.to_vec())
        } else {
            ElementValue::decode(header.vr, raw, enc.byte_order)
        };
        Ok(DataElement {
            tag: header.tag,
            vr: header.vr,
            value,
            undefined_length,
        })
    }
}

/// Split a sequence value into its items, one data set each.
///
/// `value` is the item stream as stored in an element (for undefined lengths, without the
/// closing delimiter). Sequences inside items stay as raw bytes; pass them back in to descend.
pub fn sequence_items(value: &[u8], enc: Encoding, owner: Tag, path: &Path) -> Result<Vec<DataSet>> {
    let mut walker = Walker {
        buf: value,
        pos: 0,
        path,
    };
    let mut items = Vec::new();
    while walker.pos < value.len() {
        let tag = walker.read_tag(enc.byte_order, owner)?;
        let length = walker.u32(enc.byte_order, owner)?;
        if tag == tags::SEQUENCE_DELIMITATION {
            break;
        }
        if tag != tags::ITEM {
            return Err(walker.corrupt(
                owner,
                format!("unexpected {} inside sequence", format_tag(tag)),
            ));
        }
        let mut item = DataSet::new();
        if length == UNDEFINED_LENGTH {
            loop {
                let next = walker.peek_tag(enc.byte_order);
                if next == Some(tags::ITEM_DELIMITATION) {
                    walker.bytes(8, owner)?;
                    break;
                }
                if next.is_none() {
                    return Err(walker.corrupt(owner, "item is not terminated"));
                }
                item.insert(walker.read_item_element(enc, 1)?);
            }
        } else {
            let end = walker.pos.saturating_add(length as usize);
            if end > value.len() {
                return Err(walker.corrupt(owner, "item runs past the end of its sequence"));
            }
            while walker.pos < end {
                item.insert(walker.read_item_element(enc, 1)?);
            }
            if walker.pos != end {
                return Err(walker.corrupt(owner, "item elements overrun the item length"));
            }
        }
        items.push(item);
    }
    Ok(items)
}

#[derive(Debug, PartialEq)]
pub struct EncodeError {
    pub tag: Tag,
    pub reason: String,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", format_tag(self.tag), self.reason)
    }
}

impl std::error::Error for EncodeError {}

fn write_header(
    out: &mut Vec<u8>,
    tag: Tag,
    vr: VR,
    length: u32,
    enc: Encoding,
) -> Result<(), EncodeError> {
    let order = enc.byte_order;
    out.extend_from_slice(&order.u16_bytes(tag.group()));
    out.extend_from_slice(&order.u16_bytes(tag.element()));
    if enc.explicit_vr {
        out.extend_from_slice(vr_code(vr).as_bytes());
        if has_long_length(vr) {
            out.extend_from_slice(&[0, 0]);
            out.extend_from_slice(&order.u32_bytes(length));
        } else {
            let short = u16::try_from(length).map_err(|_| EncodeError {
                tag,
                reason: if length == UNDEFINED_LENGTH {
                    format!("VR {} cannot have an undefined length", vr_code(vr))
                } else {
                    format!("{} bytes do not fit a VR {} length field", length, vr_code(vr))
                },
            })?;
            out.extend_from_slice(&order.u16_bytes(short));
        }
    } else {
        out.extend_from_slice(&order.u32_bytes(length));
    }
    Ok(())
}

fn write_delimiter(out: &mut Vec<u8>, order: ByteOrder) {
    out.extend_from_slice(&order.u16_bytes(tags::SEQUENCE_DELIMITATION.group()));
    out.extend_from_slice(&order.u16_bytes(tags::SEQUENCE_DELIMITATION.element()));
    out.extend_from_slice(&[0, 0, 0, 0]);
}

fn write_value(
    out: &mut Vec<u8>,
    tag: Tag,
    vr: VR,
    bytes: &[u8],
    undefined_length: bool,
    enc: Encoding,
) -> Result<(), EncodeError> {
    if undefined_length {
        write_header(out, tag, vr, UNDEFINED_LENGTH, enc)?;
        out.extend_from_slice(bytes);
        write_delimiter(out, enc.byte_order);
    } else {
        let length = u32::try_from(bytes.len())
            .ok()
            .filter(|len| *len != UNDEFINED_LENGTH)
            .ok_or_else(|| EncodeError {
                tag,
                reason: format!("{} bytes exceed the 32-bit length field", bytes.len()),
            })?;
        write_header(out, tag, vr, length, enc)?;
        out.extend_from_slice(bytes);
    }
    Ok(())
}

pub fn write_element(out: &mut Vec<u8>, element: &DataElement, enc: Encoding) -> Result<(), EncodeError> {
    let bytes = element
        .value
        .encode(element.vr, enc.byte_order)
        .map_err(|e| EncodeError {
            tag: element.tag,
            reason: e.to_string(),
        })?;
    write_value(out, element.tag, element.vr, &bytes, element.undefined_length, enc)
}

/// File Meta group in explicit VR little endian, led by a freshly computed group length.
pub fn encode_file_meta(meta: &FileMetaInfo) -> Result<Vec<u8>, EncodeError> {
    let mut body = Vec::new();
    for element in meta.elements().iter() {
        if element.tag != tags::FILE_META_GROUP_LENGTH {
            write_element(&mut body, element, Encoding::EXPLICIT_LE)?;
        }
    }
    let mut out = Vec::with_capacity(body.len() + 12);
    let length = ElementValue::Integer(body.len() as i64);
    write_element(
        &mut out,
        &DataElement::new(tags::FILE_META_GROUP_LENGTH, VR::UL, length),
        Encoding::EXPLICIT_LE,
    )?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Serialize a complete Part 10 file. Pixel Data lands at its ascending tag position.
pub fn encode_part10(
    preamble: &[u8; PREAMBLE_LEN],
    meta: &FileMetaInfo,
    dataset: &DataSet,
    pixel: Option<&PixelElement>,
    enc: Encoding,
) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(
        PREAMBLE_LEN + 4 + pixel.map(|p| p.bytes.len()).unwrap_or(0) + 4096,
    );
    out.extend_from_slice(preamble);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&encode_file_meta(meta)?);

    let mut pending_pixel = pixel;
    for element in dataset.iter() {
        if element.tag > tags::PIXEL_DATA {
            if let Some(p) = pending_pixel.take() {
                write_value(&mut out, tags::PIXEL_DATA, p.vr, &p.bytes, p.undefined_length, enc)?;
            }
        }
        write_element(&mut out, element, enc)?;
    }
    if let Some(p) = pending_pixel {
        write_value(&mut out, tags::PIXEL_DATA, p.vr, &p.bytes, p.undefined_length, enc)?;
    }
    Ok(out)
}
