//! Minimal IPTC-IIM reader and writer for JPEG files.
//!
//! Handles the two Record 2 datasets the pipeline cares about:
//! - Keywords (2:25), repeatable
//! - Caption-Abstract (2:120)
//!
//! IPTC lives in the JPEG APP13 marker: a "Photoshop 3.0\0" header followed
//! by 8BIM resource blocks, where resource 0x0404 holds the raw IIM bytes.
//!
//! Writing rebuilds only the APP13 segment. Every other segment and the
//! entropy-coded image data are copied through byte for byte, so pixel
//! content (and therefore the stable ID) never changes. Unrelated 8BIM
//! resources and IIM datasets are preserved. New text is always written as
//! UTF-8 with the 1:90 coded-character-set marker.

use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IptcError {
    #[error("not a JPEG file")]
    NotJpeg,
    #[error("malformed JPEG segment at byte {0}")]
    Malformed(usize),
    #[error("IPTC {field} is {len} bytes, the limit is {max}")]
    TooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// IPTC fields extracted from a JPEG.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IptcData {
    pub caption: Option<String>,
    pub keywords: Vec<String>,
    /// An IIM block exists, even if it holds neither field.
    pub present: bool,
}

/// Fields to replace. `None` leaves the existing datasets untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IptcUpdate<'a> {
    pub keywords: Option<&'a [String]>,
    /// `Some(None)` removes the caption.
    pub caption: Option<Option<&'a str>>,
}

pub(super) const APP1: u8 = 0xE1;
const APP13: u8 = 0xED;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const BIM_MARKER: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;
/// MD5 of the IIM block; stale after any rewrite, so it is dropped.
const IPTC_DIGEST_RESOURCE_ID: u16 = 0x0425;

const CODED_CHARSET: (u8, u8) = (1, 90);
const RECORD_VERSION: (u8, u8) = (2, 0);
const KEYWORDS: (u8, u8) = (2, 25);
const CAPTION: (u8, u8) = (2, 120);
const UTF8_ESCAPE: &[u8] = b"\x1b%G";

/// IIM 4.2 maximum octets for 2:25 and 2:120.
pub const MAX_KEYWORD_BYTES: usize = 64;
pub const MAX_CAPTION_BYTES: usize = 2000;
const MAX_DATASET_BYTES: usize = 0x7FFF;
const MAX_SEGMENT_BYTES: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// JPEG segment scanning
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Segment {
    marker: u8,
    /// Whole segment including the 0xFF marker bytes.
    span: Range<usize>,
    /// Payload after the length field.
    body: Range<usize>,
}

/// Split the header part of a JPEG into segments.
///
/// Returns the segments before the first SOS (or EOI) and the offset where
/// that marker starts; everything from there on is image data.
fn scan_segments(data: &[u8]) -> Result<(Vec<Segment>, usize), IptcError> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(IptcError::NotJpeg);
    }

    let mut segments = Vec::new();
    let mut pos = 2;
    while pos < data.len() {
        if data[pos] != 0xFF {
            return Err(IptcError::Malformed(pos));
        }
        // Fill bytes
        let mut m = pos + 1;
        while m < data.len() && data[m] == 0xFF {
            m += 1;
        }
        if m >= data.len() {
            return Err(IptcError::Malformed(pos));
        }

        let marker = data[m];
        if marker == SOS || marker == EOI {
            return Ok((segments, pos));
        }
        // Markers without a length field
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            segments.push(Segment {
                marker,
                span: pos..m + 1,
                body: m + 1..m + 1,
            });
            pos = m + 1;
            continue;
        }

        if m + 2 >= data.len() {
            return Err(IptcError::Malformed(pos));
        }
        let seg_len = u16::from_be_bytes([data[m + 1], data[m + 2]]) as usize;
        let end = m + 1 + seg_len;
        if seg_len < 2 || end > data.len() {
            return Err(IptcError::Malformed(pos));
        }
        segments.push(Segment {
            marker,
            span: pos..end,
            body: m + 3..end,
        });
        pos = end;
    }
    Ok((segments, data.len()))
}

// ---------------------------------------------------------------------------
// Photoshop 8BIM resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Resource {
    id: u16,
    /// Pascal string bytes, without the length byte.
    name: Vec<u8>,
    data: Vec<u8>,
}

/// Parse the resource blocks of an APP13 payload.
fn parse_resources(segment: &[u8]) -> Vec<Resource> {
    let data = segment.strip_prefix(PHOTOSHOP_HEADER).unwrap_or(segment);

    let mut resources = Vec::new();
    let mut pos = 0;
    // Each resource: "8BIM" (4) + id (2) + pascal name (even-padded) + len (4) + data (even-padded)
    while pos + 12 <= data.len() && &data[pos..pos + 4] == BIM_MARKER {
        pos += 4;
        let id = u16::from_be_bytes([data[pos], data[pos + 1]]);
        pos += 2;

        let name_len = data[pos] as usize;
        let name_total = 1 + name_len + ((1 + name_len) % 2);
        if pos + name_total + 4 > data.len() {
            break;
        }
        let name = data[pos + 1..pos + 1 + name_len].to_vec();
        pos += name_total;

        let len =
            u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;
        if pos + len > data.len() {
            break;
        }
        resources.push(Resource {
            id,
            name,
            data: data[pos..pos + len].to_vec(),
        });
        pos += len + (len % 2);
    }
    resources
}

fn encode_resources(resources: &[Resource]) -> Vec<u8> {
    let mut out = PHOTOSHOP_HEADER.to_vec();
    for r in resources {
        out.extend_from_slice(BIM_MARKER);
        out.extend_from_slice(&r.id.to_be_bytes());
        let name_len = r.name.len().min(255);
        out.push(name_len as u8);
        out.extend_from_slice(&r.name[..name_len]);
        if (1 + name_len) % 2 == 1 {
            out.push(0);
        }
        out.extend_from_slice(&(r.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&r.data);
        if r.data.len() % 2 == 1 {
            out.push(0);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// IIM datasets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Dataset {
    record: u8,
    number: u8,
    data: Vec<u8>,
}

impl Dataset {
    fn new((record, number): (u8, u8), data: &[u8]) -> Self {
        Self {
            record,
            number,
            data: data.to_vec(),
        }
    }

    fn key(&self) -> (u8, u8) {
        (self.record, self.number)
    }
}

/// Parse raw IIM bytes.
///
/// Each dataset: 0x1C, record, dataset number, big-endian u16 length, data.
/// A length with the high bit set is an extended length: the low 15 bits
/// give the size of the real length field that follows.
fn parse_datasets(data: &[u8]) -> Vec<Dataset> {
    let mut out = Vec::new();
    let mut pos = 0;

    while pos + 5 <= data.len() {
        if data[pos] != 0x1C {
            pos += 1;
            continue;
        }
        let record = data[pos + 1];
        let number = data[pos + 2];
        let raw_len = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        pos += 5;

        let length = if raw_len & 0x8000 != 0 {
            let n = raw_len & 0x7FFF;
            if n > 4 || pos + n > data.len() {
                break;
            }
            let len = data[pos..pos + n]
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | *b as usize);
            pos += n;
            len
        } else {
            raw_len
        };

        if pos + length > data.len() {
            break;
        }
        out.push(Dataset {
            record,
            number,
            data: data[pos..pos + length].to_vec(),
        });
        pos += length;
    }
    out
}

fn encode_datasets(datasets: &[Dataset]) -> Result<Vec<u8>, IptcError> {
    let mut out = Vec::new();
    for d in datasets {
        let len = u16::try_from(d.data.len())
            .ok()
            .filter(|l| usize::from(*l) <= MAX_DATASET_BYTES)
            .ok_or(IptcError::TooLarge {
                field: "dataset",
                len: d.data.len(),
                max: MAX_DATASET_BYTES,
            })?;
        out.extend_from_slice(&[0x1C, d.record, d.number]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&d.data);
    }
    Ok(out)
}

/// Decode IIM text. Without a UTF-8 marker, invalid UTF-8 is read as Latin-1.
fn decode_text(bytes: &[u8], utf8: bool) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) if utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn iptc_from_datasets(datasets: &[Dataset]) -> IptcData {
    let utf8 = datasets
        .iter()
        .any(|d| d.key() == CODED_CHARSET && d.data == UTF8_ESCAPE);

    let mut result = IptcData::default();
    for d in datasets {
        let value = decode_text(&d.data, utf8)
            .trim_matches(char::from(0))
            .trim()
            .to_string();
        if value.is_empty() {
            continue;
        }
        match d.key() {
            KEYWORDS => result.keywords.push(value),
            CAPTION => result.caption = Some(value),
            _ => {}
        }
    }
    result
}

/// Payloads of every `marker` segment ahead of the image data.
pub(super) fn segment_payloads(jpeg: &[u8], marker: u8) -> Result<Vec<&[u8]>, IptcError> {
    let (segments, _) = scan_segments(jpeg)?;
    Ok(segments
        .into_iter()
        .filter(|s| s.marker == marker)
        .map(|s| &jpeg[s.body])
        .collect())
}

fn find_iim(data: &[u8], segments: &[Segment]) -> Option<(usize, Vec<Resource>)> {
    segments
        .iter()
        .enumerate()
        .filter(|(_, s)| s.marker == APP13 && data[s.body.clone()].starts_with(PHOTOSHOP_HEADER))
        .map(|(i, s)| (i, parse_resources(&data[s.body.clone()])))
        .next()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Read keywords and caption. Returns empty data when there is no IPTC block.
pub fn read_iptc(jpeg: &[u8]) -> Result<IptcData, IptcError> {
    let (segments, _) = scan_segments(jpeg)?;
    let Some((_, resources)) = find_iim(jpeg, &segments) else {
        return Ok(IptcData::default());
    };
    Ok(resources
        .iter()
        .find(|r| r.id == IPTC_RESOURCE_ID)
        .map(|r| IptcData {
            present: true,
            ..iptc_from_datasets(&parse_datasets(&r.data))
        })
        .unwrap_or_default())
}

fn check_lengths(update: &IptcUpdate<'_>) -> Result<(), IptcError> {
    let limit = |field, len, max| {
        if len > max {
            Err(IptcError::TooLarge { field, len, max })
        } else {
            Ok(())
        }
    };
    for keyword in update.keywords.unwrap_or_default() {
        limit("keyword", keyword.len(), MAX_KEYWORD_BYTES)?;
    }
    if let Some(Some(caption)) = update.caption {
        limit("caption", caption.len(), MAX_CAPTION_BYTES)?;
    }
    Ok(())
}

/// Return a copy of `jpeg` with the APP13 IPTC block rewritten.
///
/// Keywords over [`MAX_KEYWORD_BYTES`] or a caption over
/// [`MAX_CAPTION_BYTES`] are rejected, not truncated.
pub fn apply_update(jpeg: &[u8], update: &IptcUpdate<'_>) -> Result<Vec<u8>, IptcError> {
    check_lengths(update)?;
    let (segments, image_data_at) = scan_segments(jpeg)?;
    let existing = find_iim(jpeg, &segments);
    let existing_index = existing.as_ref().map(|(i, _)| *i);
    let mut resources = existing.map(|(_, r)| r).unwrap_or_default();

    let old_iim = resources
        .iter()
        .find(|r| r.id == IPTC_RESOURCE_ID)
        .map(|r| r.data.as_slice())
        .unwrap_or(&[]);
    let mut datasets: Vec<Dataset> = parse_datasets(old_iim)
        .into_iter()
        .filter(|d| {
            let key = d.key();
            key != CODED_CHARSET
                && key != RECORD_VERSION
                && !(update.keywords.is_some() && key == KEYWORDS)
                && !(update.caption.is_some() && key == CAPTION)
        })
        .collect();

    datasets.push(Dataset::new(CODED_CHARSET, UTF8_ESCAPE));
    datasets.push(Dataset::new(RECORD_VERSION, &[0x00, 0x04]));
    if let Some(keywords) = update.keywords {
        datasets.extend(keywords.iter().map(|k| Dataset::new(KEYWORDS, k.as_bytes())));
    }
    if let Some(Some(caption)) = update.caption {
        datasets.push(Dataset::new(CAPTION, caption.as_bytes()));
    }
    // Stable: repeated keywords keep their order
    datasets.sort_by_key(Dataset::key);
    let iim = encode_datasets(&datasets)?;

    resources.retain(|r| r.id != IPTC_DIGEST_RESOURCE_ID);
    match resources.iter_mut().find(|r| r.id == IPTC_RESOURCE_ID) {
        Some(r) => r.data = iim,
        None => resources.push(Resource {
            id: IPTC_RESOURCE_ID,
            name: Vec::new(),
            data: iim,
        }),
    }

    let body = encode_resources(&resources);
    let seg_len = u16::try_from(body.len() + 2).map_err(|_| IptcError::TooLarge {
        field: "APP13 segment",
        len: body.len() + 2,
        max: MAX_SEGMENT_BYTES,
    })?;
    let mut app13 = vec![0xFF, APP13];
    app13.extend_from_slice(&seg_len.to_be_bytes());
    app13.extend_from_slice(&body);

    // New blocks go after the leading APP0/APP1 (JFIF, Exif) segments
    let insert_at = segments
        .iter()
        .position(|s| !(0xE0..=0xE1).contains(&s.marker))
        .unwrap_or(segments.len());

    let mut out = Vec::with_capacity(jpeg.len() + app13.len());
    out.extend_from_slice(&jpeg[..2]);
    for (i, seg) in segments.iter().enumerate() {
        if existing_index == Some(i) {
            out.extend_from_slice(&app13);
            continue;
        }
        if existing_index.is_none() && i == insert_at {
            out.extend_from_slice(&app13);
        }
        out.extend_from_slice(&jpeg[seg.span.clone()]);
    }
    if existing_index.is_none() && insert_at == segments.len() {
        out.extend_from_slice(&app13);
    }
    out.extend_from_slice(&jpeg[image_data_at..]);
    Ok(out)
}
