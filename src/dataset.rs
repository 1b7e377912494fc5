//
// dataset.rs
// dicom-components
//
// Data elements, their typed values, and ordered data sets (including the File Meta group).
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;

use dicom::core::{Tag, VR};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tags;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    pub fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    pub fn read_u16(self, b: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(b),
            ByteOrder::Big => u16::from_be_bytes(b),
        }
    }

    pub fn read_u32(self, b: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        }
    }
}

/// Value of a data element, decoded according to its VR.
///
/// `Bytes` holds the exact wire bytes and is used for bulk and sequence values
/// as well as anything that cannot be represented losslessly by the other
/// variants (non-UTF-8 text, non-finite floats, 64-bit integers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElementValue {
    Text(String),
    Integer(i64),
    IntegerList(Vec<i64>),
    Decimal(Vec<f64>),
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
}

#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("{value} does not fit in VR {vr}")]
    OutOfRange { vr: String, value: i64 },
    #[error("{kind} value cannot be encoded with VR {vr}")]
    WrongKind { vr: String, kind: &'static str },
}

pub fn is_text_vr(vr: VR) -> bool {
    matches!(
        vr,
        VR::AE
            | VR::AS
            | VR::CS
            | VR::DA
            | VR::DS
            | VR::DT
            | VR::IS
            | VR::LO
            | VR::LT
            | VR::PN
            | VR::SH
            | VR::ST
            | VR::TM
            | VR::UC
            | VR::UI
            | VR::UR
            | VR::UT
    )
}

/// VRs whose explicit encoding uses a reserved field and a 32-bit length.
pub fn has_long_length(vr: VR) -> bool {
    matches!(
        vr,
        VR::OB
            | VR::OD
            | VR::OF
            | VR::OL
            | VR::OV
            | VR::OW
            | VR::SQ
            | VR::SV
            | VR::UC
            | VR::UN
            | VR::UR
            | VR::UT
            | VR::UV
    )
}

pub fn vr_code(vr: VR) -> String {
    format!("{}", vr)
}

pub fn parse_vr(code: &str) -> Option<VR> {
    match code.as_bytes() {
        [a, b] => VR::from_binary([*a, *b]),
        _ => None,
    }
}

fn pad_byte(vr: VR) -> u8 {
    if is_text_vr(vr) && vr != VR::UI {
        b' '
    } else {
        0
    }
}

/// Width in bytes and signedness of the binary integer VRs.
fn integer_layout(vr: VR) -> Option<(usize, bool)> {
    match vr {
        VR::US => Some((2, false)),
        VR::SS => Some((2, true)),
        VR::UL | VR::AT => Some((4, false)),
        VR::SL => Some((4, true)),
        _ => None,
    }
}

impl ElementValue {
    /// Decode wire bytes. `encode` of the result reproduces `bytes` exactly.
    pub fn decode(vr: VR, bytes: &[u8], order: ByteOrder) -> ElementValue {
        if is_text_vr(vr) {
            return match std::str::from_utf8(bytes) {
                Ok(text) => ElementValue::Text(text.to_string()),
                Err(_) => ElementValue::Bytes(bytes.to_vec()),
            };
        }
        if let Some((width, signed)) = integer_layout(vr) {
            if bytes.len() % width != 0 {
                return ElementValue::Bytes(bytes.to_vec());
            }
            let mut values: Vec<i64> = bytes
                .chunks_exact(width)
                .map(|c| match (width, signed) {
                    (2, false) => order.read_u16([c[0], c[1]]) as i64,
                    (2, true) => order.read_u16([c[0], c[1]]) as i16 as i64,
                    _ if vr == VR::AT => {
                        let group = order.read_u16([c[0], c[1]]) as i64;
                        let element = order.read_u16([c[2], c[3]]) as i64;
                        (group << 16) | element
                    }
                    (_, false) => order.read_u32([c[0], c[1], c[2], c[3]]) as i64,
                    (_, true) => order.read_u32([c[0], c[1], c[2], c[3]]) as i32 as i64,
                })
                .collect();
            return if values.len() == 1 {
                ElementValue::Integer(values.remove(0))
            } else {
                ElementValue::IntegerList(values)
            };
        }
        match vr {
            VR::FL if bytes.len() % 4 == 0 => {
                let values: Vec<f64> = bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_bits(order.read_u32([c[0], c[1], c[2], c[3]])) as f64)
                    .collect();
                Self::finite_or_bytes(values, bytes)
            }
            VR::FD if bytes.len() % 8 == 0 => {
                let values: Vec<f64> = bytes
                    .chunks_exact(8)
                    .map(|c| {
                        let mut b = [0u8; 8];
                        b.copy_from_slice(c);
                        match order {
                            ByteOrder::Little => f64::from_le_bytes(b),
                            ByteOrder::Big => f64::from_be_bytes(b),
                        }
                    })
                    .collect();
                Self::finite_or_bytes(values, bytes)
            }
            _ => ElementValue::Bytes(bytes.to_vec()),
        }
    }

    fn finite_or_bytes(values: Vec<f64>, bytes: &[u8]) -> ElementValue {
        // JSON has no representation for NaN or infinities.
        if values.iter().all(|v| v.is_finite()) {
            ElementValue::Decimal(values)
        } else {
            ElementValue::Bytes(bytes.to_vec())
        }
    }

    /// Encode to wire bytes, padded to even length.
    pub fn encode(&self, vr: VR, order: ByteOrder) -> Result<Vec<u8>, ValueError> {
        let mut out = match self {
            ElementValue::Text(text) => text.as_bytes().to_vec(),
            ElementValue::Bytes(bytes) => bytes.clone(),
            ElementValue::Integer(v) => encode_integers(vr, std::slice::from_ref(v), order)?,
            ElementValue::IntegerList(values) => encode_integers(vr, values, order)?,
            ElementValue::Decimal(values) => match vr {
                VR::FL => values
                    .iter()
                    .flat_map(|v| order.u32_bytes((*v as f32).to_bits()))
                    .collect(),
                VR::FD => values
                    .iter()
                    .flat_map(|v| match order {
                        ByteOrder::Little => v.to_le_bytes(),
                        ByteOrder::Big => v.to_be_bytes(),
                    })
                    .collect(),
                _ => {
                    return Err(ValueError::WrongKind {
                        vr: vr_code(vr),
                        kind: "decimal",
                    })
                }
            },
        };
        if out.len() % 2 == 1 {
            out.push(pad_byte(vr));
        }
        Ok(out)
    }

    /// Text with trailing padding removed; `None` for non-text values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ElementValue::Text(text) => Some(text.trim_end_matches([' ', '\0'])),
            _ => None,
        }
    }

    /// First value interpreted as an unsigned integer (binary or IS text).
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            ElementValue::Integer(v) => u64::try_from(*v).ok(),
            ElementValue::IntegerList(values) => values.first().and_then(|v| u64::try_from(*v).ok()),
            ElementValue::Text(text) => text
                .split('\\')
                .next()
                .and_then(|s| s.trim_matches([' ', '\0']).parse::<u64>().ok()),
            _ => None,
        }
    }

    /// Strict equality: text ignores trailing padding only, floats compare bitwise.
    pub fn strict_eq(&self, other: &ElementValue) -> bool {
        match (self, other) {
            (ElementValue::Text(_), ElementValue::Text(_)) => self.as_text() == other.as_text(),
            (ElementValue::Decimal(a), ElementValue::Decimal(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            _ => self == other,
        }
    }

    /// Short human-readable rendering for reports.
    pub fn preview(&self, max_len: usize) -> String {
        let text = match self {
            ElementValue::Text(text) => text.trim_end_matches([' ', '\0']).to_string(),
            ElementValue::Integer(v) => v.to_string(),
            ElementValue::IntegerList(values) => format!("{:?}", values),
            ElementValue::Decimal(values) => format!("{:?}", values),
            ElementValue::Bytes(bytes) => format!("{} bytes", bytes.len()),
        };
        if text.chars().count() <= max_len {
            text
        } else {
            let mut truncated: String = text.chars().take(max_len).collect();
            truncated.push('…');
            truncated
        }
    }
}

fn encode_integers(vr: VR, values: &[i64], order: ByteOrder) -> Result<Vec<u8>, ValueError> {
    let out_of_range = |value: i64| ValueError::OutOfRange {
        vr: vr_code(vr),
        value,
    };
    let mut out = Vec::with_capacity(values.len() * 4);
    for &value in values {
        match vr {
            VR::US => {
                let v = u16::try_from(value).map_err(|_| out_of_range(value))?;
                out.extend_from_slice(&order.u16_bytes(v));
            }
            VR::SS => {
                let v = i16::try_from(value).map_err(|_| out_of_range(value))?;
                out.extend_from_slice(&order.u16_bytes(v as u16));
            }
            VR::UL => {
                let v = u32::try_from(value).map_err(|_| out_of_range(value))?;
                out.extend_from_slice(&order.u32_bytes(v));
            }
            VR::SL => {
                let v = i32::try_from(value).map_err(|_| out_of_range(value))?;
                out.extend_from_slice(&order.u32_bytes(v as u32));
            }
            VR::AT => {
                let v = u32::try_from(value).map_err(|_| out_of_range(value))?;
                out.extend_from_slice(&order.u16_bytes((v >> 16) as u16));
                out.extend_from_slice(&order.u16_bytes((v & 0xFFFF) as u16));
            }
            _ => {
                return Err(ValueError::WrongKind {
                    vr: vr_code(vr),
                    kind: "integer",
                })
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataElement {
    pub tag: Tag,
    pub vr: VR,
    pub value: ElementValue,
    /// Encoded with the 0xFFFFFFFF length and closed by a sequence delimiter.
    pub undefined_length: bool,
}

impl DataElement {
    pub fn new(tag: Tag, vr: VR, value: ElementValue) -> Self {
        DataElement {
            tag,
            vr,
            value,
            undefined_length: false,
        }
    }

    pub fn text(tag: Tag, vr: VR, text: &str) -> Self {
        Self::new(tag, vr, ElementValue::Text(text.to_string()))
    }
}

/// Ordered tag → element mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    elements: BTreeMap<Tag, DataElement>,
}

impl DataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, returning the previous element for that tag.
    pub fn insert(&mut self, element: DataElement) -> Option<DataElement> {
        self.elements.insert(element.tag, element)
    }

    pub fn get(&self, tag: Tag) -> Option<&DataElement> {
        self.elements.get(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    pub fn remove(&mut self, tag: Tag) -> Option<DataElement> {
        self.elements.remove(&tag)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&DataElement) -> bool) {
        self.elements.retain(|_, e| keep(e));
    }

    /// Elements in ascending tag order.
    pub fn iter(&self) -> impl Iterator<Item = &DataElement> {
        self.elements.values()
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.elements.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn text(&self, tag: Tag) -> Option<&str> {
        self.get(tag).and_then(|e| e.value.as_text())
    }

    pub fn uint(&self, tag: Tag) -> Option<u64> {
        self.get(tag).and_then(|e| e.value.as_uint())
    }
}

impl FromIterator<DataElement> for DataSet {
    fn from_iter<I: IntoIterator<Item = DataElement>>(iter: I) -> Self {
        let mut set = DataSet::new();
        for element in iter {
            set.insert(element);
        }
        set
    }
}

/// The group 0002 elements preceding the data set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileMetaInfo {
    elements: DataSet,
}

impl FileMetaInfo {
    /// Keeps only group 0002 elements of `elements`.
    pub fn from_dataset(mut elements: DataSet) -> Self {
        elements.retain(|e| e.tag.group() == 0x0002);
        FileMetaInfo { elements }
    }

    pub fn elements(&self) -> &DataSet {
        &self.elements
    }

    pub fn insert(&mut self, element: DataElement) {
        if element.tag.group() == 0x0002 {
            self.elements.insert(element);
        }
    }

    pub fn transfer_syntax_uid(&self) -> Option<&str> {
        self.elements.text(tags::TRANSFER_SYNTAX_UID)
    }

    pub fn media_storage_sop_class_uid(&self) -> Option<&str> {
        self.elements.text(tags::MEDIA_STORAGE_SOP_CLASS_UID)
    }

    pub fn media_storage_sop_instance_uid(&self) -> Option<&str> {
        self.elements.text(tags::MEDIA_STORAGE_SOP_INSTANCE_UID)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_keeps_padding_on_the_wire() {
        let value = ElementValue::decode(VR::CS, b"CT", ByteOrder::Little);
        assert_eq!(value, ElementValue::Text("CT".into()));

        let padded = ElementValue::decode(VR::LO, b"ABC ", ByteOrder::Little);
        assert_eq!(padded.as_text(), Some("ABC"));
        assert_eq!(padded.encode(VR::LO, ByteOrder::Little).unwrap(), b"ABC ");
    }

    #[test]
    fn odd_text_is_padded_per_vr() {
        let uid = ElementValue::Text("1.2.3".into());
        assert_eq!(uid.encode(VR::UI, ByteOrder::Little).unwrap(), b"1.2.3\0");
        let name = ElementValue::Text("Doe".into());
        assert_eq!(name.encode(VR::PN, ByteOrder::Little).unwrap(), b"Doe ");
    }

    #[test]
    fn integers_follow_byte_order() {
        let le = ElementValue::decode(VR::US, &[0x00, 0x02], ByteOrder::Little);
        assert_eq!(le, ElementValue::Integer(512));
        let be = ElementValue::decode(VR::US, &[0x02, 0x00], ByteOrder::Big);
        assert_eq!(be, ElementValue::Integer(512));
        assert_eq!(be.encode(VR::US, ByteOrder::Big).unwrap(), vec![0x02, 0x00]);

        let ss = ElementValue::decode(VR::SS, &[0xFF, 0xFF, 0x01, 0x00], ByteOrder::Little);
        assert_eq!(ss, ElementValue::IntegerList(vec![-1, 1]));
    }

    #[test]
    fn attribute_tags_pack_group_and_element() {
        let bytes = [0x28, 0x00, 0x10, 0x00];
        let value = ElementValue::decode(VR::AT, &bytes, ByteOrder::Little);
        assert_eq!(value, ElementValue::Integer(0x0028_0010));
        assert_eq!(value.encode(VR::AT, ByteOrder::Little).unwrap(), bytes);
    }

    #[test]
    fn floats_survive_exactly() {
        let bytes = 0.1_f32.to_le_bytes();
        let value = ElementValue::decode(VR::FL, &bytes, ByteOrder::Little);
        assert!(matches!(value, ElementValue::Decimal(_)));
        assert_eq!(value.encode(VR::FL, ByteOrder::Little).unwrap(), bytes);

        let nan = f64::NAN.to_le_bytes();
        let value = ElementValue::decode(VR::FD, &nan, ByteOrder::Little);
        assert_eq!(value, ElementValue::Bytes(nan.to_vec()));
    }

    #[test]
    fn invalid_utf8_text_falls_back_to_bytes() {
        let value = ElementValue::decode(VR::PN, &[0x4D, 0xFC], ByteOrder::Little);
        assert_eq!(value, ElementValue::Bytes(vec![0x4D, 0xFC]));
    }

    #[test]
    fn out_of_range_integer_is_rejected() {
        let err = ElementValue::Integer(70_000)
            .encode(VR::US, ByteOrder::Little)
            .unwrap_err();
        assert!(matches!(err, ValueError::OutOfRange { value: 70_000, .. }));
        let err = ElementValue::Integer(1)
            .encode(VR::LO, ByteOrder::Little)
            .unwrap_err();
        assert!(matches!(err, ValueError::WrongKind { .. }));
    }

    #[test]
    fn strict_equality_has_no_float_tolerance() {
        let a = ElementValue::Decimal(vec![1.0]);
        let b = ElementValue::Decimal(vec![1.0 + f64::EPSILON]);
        assert!(!a.strict_eq(&b));
        assert!(!ElementValue::Decimal(vec![0.0]).strict_eq(&ElementValue::Decimal(vec![-0.0])));
        assert!(ElementValue::Text("70 ".into()).strict_eq(&ElementValue::Text("70".into())));
        assert!(!ElementValue::Text("70".into()).strict_eq(&ElementValue::Text("70.0".into())));
    }

    #[test]
    fn integer_strings_are_readable_as_uint() {
        assert_eq!(ElementValue::Text("3 ".into()).as_uint(), Some(3));
        assert_eq!(ElementValue::Integer(512).as_uint(), Some(512));
        assert_eq!(ElementValue::Integer(-1).as_uint(), None);
    }

    #[test]
    fn file_meta_only_holds_group_two() {
        let set: DataSet = vec![
            DataElement::text(tags::TRANSFER_SYNTAX_UID, VR::UI, "1.2.840.10008.1.2.1\0"),
            DataElement::text(tags::SOP_CLASS_UID, VR::UI, "1.2\0"),
        ]
        .into_iter()
        .collect();
        let meta = FileMetaInfo::from_dataset(set);
        assert_eq!(meta.elements().len(), 1);
        assert_eq!(meta.transfer_syntax_uid(), Some("1.2.840.10008.1.2.1"));
    }

    #[test]
    fn values_serialize_with_their_kind() {
        let json = serde_json::to_string(&ElementValue::Bytes(vec![0xAB, 0x01])).unwrap();
        assert_eq!(json, r#"{"Bytes":"ab01"}"#);
        let back: ElementValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ElementValue::Bytes(vec![0xAB, 0x01]));
    }
}
