//! Keyword dictionary for the attributes scripts commonly reference.

use crate::item::{Tag, Vr};

pub struct DictionaryEntry {
    pub keyword: &'static str,
    pub tag: Tag,
    pub vr: Vr,
}

const fn entry(keyword: &'static str, group: u16, element: u16, vr: Vr) -> DictionaryEntry {
    DictionaryEntry {
        keyword,
        tag: Tag(group, element),
        vr,
    }
}

static ENTRIES: &[DictionaryEntry] = &[
    entry("SOPClassUID", 0x0008, 0x0016, Vr::UI),
    entry("SOPInstanceUID", 0x0008, 0x0018, Vr::UI),
    entry("StudyDate", 0x0008, 0x0020, Vr::DA),
    entry("SeriesDate", 0x0008, 0x0021, Vr::DA),
    entry("StudyTime", 0x0008, 0x0030, Vr::TM),
    entry("AccessionNumber", 0x0008, 0x0050, Vr::SH),
    entry("Modality", 0x0008, 0x0060, Vr::CS),
    entry("Manufacturer", 0x0008, 0x0070, Vr::LO),
    entry("InstitutionName", 0x0008, 0x0080, Vr::LO),
    entry("ReferringPhysicianName", 0x0008, 0x0090, Vr::PN),
    entry("StationName", 0x0008, 0x1010, Vr::SH),
    entry("StudyDescription", 0x0008, 0x1030, Vr::LO),
    entry("SeriesDescription", 0x0008, 0x103E, Vr::LO),
    entry("ManufacturerModelName", 0x0008, 0x1090, Vr::LO),
    entry("ReferencedImageSequence", 0x0008, 0x1140, Vr::SQ),
    entry("ReferencedSOPClassUID", 0x0008, 0x1150, Vr::UI),
    entry("ReferencedSOPInstanceUID", 0x0008, 0x1155, Vr::UI),
    entry("ImageType", 0x0008, 0x0008, Vr::CS),
    entry("PatientName", 0x0010, 0x0010, Vr::PN),
    entry("PatientID", 0x0010, 0x0020, Vr::LO),
    entry("PatientBirthDate", 0x0010, 0x0030, Vr::DA),
    entry("PatientSex", 0x0010, 0x0040, Vr::CS),
    entry("PatientAge", 0x0010, 0x1010, Vr::AS),
    entry("PatientWeight", 0x0010, 0x1030, Vr::DS),
    entry("BodyPartExamined", 0x0018, 0x0015, Vr::CS),
    entry("SliceThickness", 0x0018, 0x0050, Vr::DS),
    entry("KVP", 0x0018, 0x0060, Vr::DS),
    entry("ProtocolName", 0x0018, 0x1030, Vr::LO),
    entry("StudyInstanceUID", 0x0020, 0x000D, Vr::UI),
    entry("SeriesInstanceUID", 0x0020, 0x000E, Vr::UI),
    entry("StudyID", 0x0020, 0x0010, Vr::SH),
    entry("SeriesNumber", 0x0020, 0x0011, Vr::IS),
    entry("InstanceNumber", 0x0020, 0x0013, Vr::IS),
    entry("SamplesPerPixel", 0x0028, 0x0002, Vr::US),
    entry("PhotometricInterpretation", 0x0028, 0x0004, Vr::CS),
    entry("Rows", 0x0028, 0x0010, Vr::US),
    entry("Columns", 0x0028, 0x0011, Vr::US),
    entry("BitsAllocated", 0x0028, 0x0100, Vr::US),
    entry("BurnedInAnnotation", 0x0028, 0x0301, Vr::CS),
    entry("ContentSequence", 0x0040, 0xA730, Vr::SQ),
    entry("ConceptNameCodeSequence", 0x0040, 0xA043, Vr::SQ),
    entry("CodeValue", 0x0008, 0x0100, Vr::SH),
    entry("CodeMeaning", 0x0008, 0x0104, Vr::LO),
    entry("PixelData", 0x7FE0, 0x0010, Vr::OW),
];

/// Looks a keyword up case-sensitively, the way DICOM keywords are defined.
pub fn lookup(keyword: &str) -> Option<&'static DictionaryEntry> {
    ENTRIES.iter().find(|e| e.keyword == keyword)
}

pub fn tag_for(keyword: &str) -> Option<Tag> {
    lookup(keyword).map(|e| e.tag)
}

pub fn keyword_for(tag: Tag) -> Option<&'static str> {
    ENTRIES.iter().find(|e| e.tag == tag).map(|e| e.keyword)
}

pub fn vr_for(tag: Tag) -> Option<Vr> {
    ENTRIES.iter().find(|e| e.tag == tag).map(|e| e.vr)
}
