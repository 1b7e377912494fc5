//
// round_trip.rs
// dicom-components
//
// Integration tests: extraction, recombination and comparison of files written by dicom-rs and by
// the crate's own codec, across transfer syntaxes, pixel formats and extraction modes.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::{Path, PathBuf};

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::entries::{EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN};
use dicom_components::codec::{self, PixelElement};
use dicom_components::dataset::{self as ds, DataSet, ElementValue, FileMetaInfo};
use dicom_components::syntax::Encoding;
use dicom_components::{
    analyze_compression, compare, extract, extract_file, process_directory, recombine, tags, Error,
    ExtractionMode, PixelFormat,
};
use tempfile::{tempdir, TempDir};

struct Fixture<'a> {
    transfer_syntax: &'a str,
    rows: u16,
    columns: u16,
    bits: u16,
    patient: &'a str,
    modality: &'a str,
    instance_uid: &'a str,
    seed: u8,
}

impl Default for Fixture<'_> {
    fn default() -> Self {
        Fixture {
            transfer_syntax: EXPLICIT_VR_LITTLE_ENDIAN.uid(),
            rows: 4,
            columns: 4,
            bits: 16,
            patient: "Test^Patient",
            modality: "CT",
            instance_uid: "1.2.826.0.1.3680043.2.1125.1",
            seed: 0,
        }
    }
}

impl Fixture<'_> {
    fn pixel_bytes(&self) -> Vec<u8> {
        let len = self.rows as usize * self.columns as usize * (self.bits as usize / 8);
        (0..len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(self.seed))
            .collect()
    }

    /// Write a CT-like instance with dicom-rs.
    fn write(&self, path: &Path) {
        let mut obj = InMemDicomObject::new_empty_with_dict(StandardDataDictionary);
        let put = |obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: PrimitiveValue| {
            obj.put(DataElement::new(tag, vr, value));
        };
        put(&mut obj, Tag(0x0008, 0x0005), VR::CS, PrimitiveValue::from("ISO_IR 100"));
        put(&mut obj, Tag(0x0008, 0x0016), VR::UI, PrimitiveValue::from("1.2.840.10008.5.1.4.1.1.2"));
        put(&mut obj, Tag(0x0008, 0x0018), VR::UI, PrimitiveValue::from(self.instance_uid));
        put(&mut obj, Tag(0x0008, 0x0020), VR::DA, PrimitiveValue::from("20240101"));
        put(&mut obj, Tag(0x0008, 0x0060), VR::CS, PrimitiveValue::from(self.modality));
        put(&mut obj, Tag(0x0010, 0x0010), VR::PN, PrimitiveValue::from(self.patient));
        put(&mut obj, Tag(0x0010, 0x0020), VR::LO, PrimitiveValue::from("PAT123"));
        put(&mut obj, Tag(0x0018, 0x0050), VR::DS, PrimitiveValue::from("0.625"));
        put(&mut obj, Tag(0x0020, 0x000D), VR::UI, PrimitiveValue::from("1.2.826.0.1.3680043.2.1125.2"));
        put(&mut obj, Tag(0x0020, 0x000E), VR::UI, PrimitiveValue::from("1.2.826.0.1.3680043.2.1125.3"));
        put(&mut obj, Tag(0x0028, 0x0002), VR::US, PrimitiveValue::from(1_u16));
        put(&mut obj, Tag(0x0028, 0x0004), VR::CS, PrimitiveValue::from("MONOCHROME2"));
        put(&mut obj, Tag(0x0028, 0x0010), VR::US, PrimitiveValue::from(self.rows));
        put(&mut obj, Tag(0x0028, 0x0011), VR::US, PrimitiveValue::from(self.columns));
        put(&mut obj, Tag(0x0028, 0x0100), VR::US, PrimitiveValue::from(self.bits));
        put(&mut obj, Tag(0x0028, 0x0101), VR::US, PrimitiveValue::from(self.bits));
        put(&mut obj, Tag(0x0028, 0x0102), VR::US, PrimitiveValue::from(self.bits - 1));
        put(&mut obj, Tag(0x0028, 0x0103), VR::US, PrimitiveValue::from(0_u16));
        put(&mut obj, Tag(0x0028, 0x1052), VR::DS, PrimitiveValue::from("-1024"));
        put(&mut obj, Tag(0x0028, 0x1053), VR::DS, PrimitiveValue::from("1"));
        put(&mut obj, Tag(0x0029, 0x0010), VR::LO, PrimitiveValue::from("ACME 1.0"));
        put(&mut obj, Tag(0x0029, 0x1010), VR::OB, PrimitiveValue::from(vec![1_u8, 2, 3, 4]));
        let pixel_vr = if self.bits > 8 { VR::OW } else { VR::OB };
        put(&mut obj, Tag(0x7FE0, 0x0010), pixel_vr, PrimitiveValue::from(self.pixel_bytes()));

        let meta = FileMetaTableBuilder::new()
            .transfer_syntax(self.transfer_syntax)
            .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.2")
            .media_storage_sop_instance_uid(self.instance_uid)
            .build()
            .expect("meta");
        let mut file_obj =
            FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
        for elem in obj {
            file_obj.put(elem);
        }
        file_obj.write_to_file(path).expect("write test dicom");
    }
}

fn workspace() -> TempDir {
    tempdir().expect("tempdir")
}

/// Extract then recombine; returns the rebuilt file.
fn round_trip(dir: &Path, source: &Path, mode: ExtractionMode, format: PixelFormat) -> PathBuf {
    let out = dir.join(format!("out_{}_{}", mode, format));
    let extracted = extract_file(source, &out, mode, format).expect("extract");
    let target = out.join("recombined.dcm");
    recombine(&extracted.metadata_path, &extracted.pixel_path, &target).expect("recombine");
    target
}

#[test]
fn ct_slice_round_trips_identically() {
    let dir = workspace();
    let source = dir.path().join("ct_slice.dcm");
    Fixture {
        rows: 512,
        columns: 512,
        ..Fixture::default()
    }
    .write(&source);

    let info = analyze_compression(&source).expect("compression");
    assert!(!info.is_compressed);
    assert_eq!(info.compression_ratio, 1.0);
    assert_eq!(info.theoretical_uncompressed_size, 512 * 512 * 2);

    let rebuilt = round_trip(dir.path(), &source, ExtractionMode::Full, PixelFormat::Raw);
    let result = compare(&source, &rebuilt).expect("compare");
    assert!(result.is_identical, "{:#?}", result);
    assert_eq!(fs::read(&rebuilt).unwrap(), fs::read(&source).unwrap());
}

#[test]
fn recombined_files_open_with_dicom_rs() {
    let dir = workspace();
    let source = dir.path().join("ct.dcm");
    Fixture::default().write(&source);

    for mode in [
        ExtractionMode::Minimal,
        ExtractionMode::Standard,
        ExtractionMode::Full,
    ] {
        let rebuilt = round_trip(dir.path(), &source, mode, PixelFormat::Raw);
        let obj = dicom::object::open_file(&rebuilt).expect("open recombined");
        let rows: u16 = obj
            .element(Tag(0x0028, 0x0010))
            .expect("rows")
            .to_int()
            .expect("rows value");
        assert_eq!(rows, 4);
        let pixels = obj
            .element(Tag(0x7FE0, 0x0010))
            .expect("pixels")
            .to_bytes()
            .expect("pixel bytes")
            .into_owned();
        assert_eq!(pixels, Fixture::default().pixel_bytes());
        assert_eq!(pixels.len() % 2, 0);
    }
}

#[test]
fn reduced_modes_keep_pixels_but_drop_tags() {
    let dir = workspace();
    let source = dir.path().join("ct.dcm");
    Fixture::default().write(&source);

    let rebuilt = round_trip(dir.path(), &source, ExtractionMode::Minimal, PixelFormat::Raw);
    let result = compare(&source, &rebuilt).expect("compare");
    assert!(!result.is_identical);
    assert!(result.pixel_data_identical);
    assert!(result.extra_tags.is_empty());
    assert!(result.value_differences.is_empty(), "{:#?}", result.value_differences);
    assert!(result.missing_tags.contains(&"(0010,0010)".to_string()));

    let rebuilt = round_trip(dir.path(), &source, ExtractionMode::Standard, PixelFormat::Raw);
    let result = compare(&source, &rebuilt).expect("compare");
    assert_eq!(result.missing_tags, vec!["(0029,1010)".to_string()]);
}

#[test]
fn raw_and_pickle_artifacts_rebuild_the_same_file() {
    let dir = workspace();
    let source = dir.path().join("ct.dcm");
    Fixture::default().write(&source);

    let from_raw = round_trip(dir.path(), &source, ExtractionMode::Full, PixelFormat::Raw);
    let from_pickle = round_trip(dir.path(), &source, ExtractionMode::Full, PixelFormat::Pickle);
    assert_eq!(fs::read(from_raw).unwrap(), fs::read(from_pickle).unwrap());
}

#[test]
fn unrelated_files_differ() {
    let dir = workspace();
    let a = dir.path().join("a.dcm");
    let b = dir.path().join("b.dcm");
    Fixture::default().write(&a);
    Fixture {
        patient: "Other^Person",
        modality: "MR",
        instance_uid: "1.2.826.0.1.3680043.2.1125.99",
        seed: 7,
        ..Fixture::default()
    }
    .write(&b);

    let result = compare(&a, &b).expect("compare");
    assert!(!result.is_identical);
    assert!(!result.value_differences.is_empty());
    assert!(!result.pixel_data_identical);
    let differing: Vec<_> = result.value_differences.iter().map(|d| d.name.as_str()).collect();
    assert!(differing.contains(&"Modality"));
    assert!(differing.contains(&"PatientName"));
}

#[test]
fn implicit_vr_source_round_trips() {
    let dir = workspace();
    let source = dir.path().join("implicit.dcm");
    Fixture {
        transfer_syntax: IMPLICIT_VR_LITTLE_ENDIAN.uid(),
        ..Fixture::default()
    }
    .write(&source);

    let rebuilt = round_trip(dir.path(), &source, ExtractionMode::Full, PixelFormat::Pickle);
    assert_eq!(fs::read(&rebuilt).unwrap(), fs::read(&source).unwrap());
}

fn meta_for(ts: &str) -> FileMetaInfo {
    let mut meta = FileMetaInfo::default();
    meta.insert(ds::DataElement::new(
        tags::FILE_META_INFORMATION_VERSION,
        VR::OB,
        ElementValue::Bytes(vec![0, 1]),
    ));
    meta.insert(ds::DataElement::text(
        tags::MEDIA_STORAGE_SOP_CLASS_UID,
        VR::UI,
        "1.2.840.10008.5.1.4.1.1.2\0",
    ));
    meta.insert(ds::DataElement::text(
        tags::MEDIA_STORAGE_SOP_INSTANCE_UID,
        VR::UI,
        "1.2.3.4.5\0",
    ));
    meta.insert(ds::DataElement::text(tags::TRANSFER_SYNTAX_UID, VR::UI, ts));
    meta
}

fn geometry(rows: i64, columns: i64, bits: i64) -> Vec<ds::DataElement> {
    vec![
        ds::DataElement::text(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3.4.5\0"),
        ds::DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, ElementValue::Integer(1)),
        ds::DataElement::new(tags::ROWS, VR::US, ElementValue::Integer(rows)),
        ds::DataElement::new(tags::COLUMNS, VR::US, ElementValue::Integer(columns)),
        ds::DataElement::new(tags::BITS_ALLOCATED, VR::US, ElementValue::Integer(bits)),
        ds::DataElement::new(tags::RESCALE_SLOPE, VR::DS, ElementValue::Text("1.5 ".into())),
        ds::DataElement::new(Tag(0x0018, 0x0088), VR::FD, ElementValue::Decimal(vec![0.1])),
    ]
}

#[test]
fn big_endian_source_round_trips() {
    let dir = workspace();
    let source = dir.path().join("big.dcm");
    let dataset: DataSet = geometry(2, 2, 16).into_iter().collect();
    let pixel = PixelElement {
        vr: VR::OW,
        bytes: vec![0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00],
        undefined_length: false,
    };
    let bytes = codec::encode_part10(
        &[0; 128],
        &meta_for("1.2.840.10008.1.2.2\0"),
        &dataset,
        Some(&pixel),
        Encoding::EXPLICIT_BE,
    )
    .expect("encode");
    fs::write(&source, &bytes).unwrap();

    let rebuilt = round_trip(dir.path(), &source, ExtractionMode::Full, PixelFormat::Raw);
    assert_eq!(fs::read(&rebuilt).unwrap(), bytes);
    assert!(compare(&source, &rebuilt).unwrap().is_identical);
}

#[test]
fn encapsulated_pixels_and_sequences_round_trip() {
    let dir = workspace();
    let source = dir.path().join("jpeg.dcm");

    // Referenced Image Sequence with one undefined-length item.
    let mut seq = vec![0xFE, 0xFF, 0x00, 0xE0, 0xFF, 0xFF, 0xFF, 0xFF];
    seq.extend_from_slice(&[0x08, 0x00, 0x50, 0x11, b'U', b'I', 4, 0, b'1', b'.', b'2', 0]);
    seq.extend_from_slice(&[0xFE, 0xFF, 0x0D, 0xE0, 0, 0, 0, 0]);
    let mut dataset: DataSet = geometry(8, 8, 8).into_iter().collect();
    dataset.insert(ds::DataElement {
        tag: Tag(0x0008, 0x1140),
        vr: VR::SQ,
        value: ElementValue::Bytes(seq),
        undefined_length: true,
    });

    let mut fragments = vec![0xFE, 0xFF, 0x00, 0xE0, 0, 0, 0, 0];
    fragments.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0, 6, 0, 0, 0]);
    fragments.extend_from_slice(&[0xFF, 0xD8, 0xAA, 0xBB, 0xFF, 0xD9]);
    let pixel = PixelElement {
        vr: VR::OB,
        bytes: fragments.clone(),
        undefined_length: true,
    };
    let bytes = codec::encode_part10(
        &[0; 128],
        &meta_for("1.2.840.10008.1.2.4.50"),
        &dataset,
        Some(&pixel),
        Encoding::EXPLICIT_LE,
    )
    .expect("encode");
    fs::write(&source, &bytes).unwrap();

    let info = analyze_compression(&source).unwrap();
    assert!(info.is_compressed);
    assert!(info.compression_ratio > 1.0);

    for format in [PixelFormat::Raw, PixelFormat::Pickle] {
        let rebuilt = round_trip(dir.path(), &source, ExtractionMode::Full, format);
        assert_eq!(fs::read(&rebuilt).unwrap(), bytes);
    }
}

#[test]
fn non_dicom_input_is_rejected() {
    let dir = workspace();
    let source = dir.path().join("notes.dcm");
    fs::write(&source, b"plain text, not a DICOM file").unwrap();
    let err = extract_file(&source, &dir.path().join("out"), ExtractionMode::Full, PixelFormat::Raw)
        .unwrap_err();
    assert!(matches!(err, Error::NotADicomFile { .. }));
    assert!(err.to_string().contains("notes.dcm"));
}

#[test]
fn directory_sweep_skips_bad_files() {
    let dir = workspace();
    let input = dir.path().join("in");
    fs::create_dir(&input).unwrap();
    Fixture::default().write(&input.join("first.dcm"));
    Fixture {
        instance_uid: "1.2.826.0.1.3680043.2.1125.77",
        seed: 3,
        ..Fixture::default()
    }
    .write(&input.join("second.dcm"));
    fs::write(input.join("broken.dcm"), b"garbage").unwrap();

    let out = dir.path().join("out");
    let summary = extract(&input, &out, ExtractionMode::Full, PixelFormat::Raw).expect("sweep");
    assert_eq!(summary.extracted.len(), 2);
    assert_eq!(summary.failures.len(), 1);
    assert!(out.join("first_metadata.json").is_file());
    assert!(out.join("second_pixels.raw").is_file());

    let summary = process_directory(&input, &out, ExtractionMode::Full, PixelFormat::Pickle)
        .expect("process");
    assert_eq!(summary.round_trips.len(), 2);
    assert!(summary.round_trips.iter().all(|t| t.is_identical && t.byte_identical));
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].path.ends_with("broken.dcm"));
    assert!(!summary.all_identical());
    assert!(out.join("first_recombined.dcm").is_file());
}
