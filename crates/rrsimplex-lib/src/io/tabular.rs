use csv::ReaderBuilder;
use encoding_rs::{Encoding, GBK, UTF_8, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use crate::config::LoaderSettings;
use crate::error::{Result, SimplexError};
use crate::signal::RawSeries;

/// Text encodings tried, in order, when a recording is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CandidateEncoding {
    /// Strict UTF-8. A leading byte-order mark is rejected so that BOM files
    /// fall through to `Utf8Sig` instead of leaking U+FEFF into the header.
    Utf8,
    /// UTF-8 with an optional byte-order mark stripped.
    Utf8Sig,
    Gbk,
    /// Decoded with the GBK table, which is a superset of GB2312.
    Gb2312,
    /// ISO-8859-1 family, decoded as windows-1252. Accepts every byte.
    Latin1,
}

impl CandidateEncoding {
    pub const DEFAULT_ORDER: [CandidateEncoding; 5] = [
        CandidateEncoding::Utf8,
        CandidateEncoding::Utf8Sig,
        CandidateEncoding::Gbk,
        CandidateEncoding::Gb2312,
        CandidateEncoding::Latin1,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CandidateEncoding::Utf8 => "utf-8",
            CandidateEncoding::Utf8Sig => "utf-8-sig",
            CandidateEncoding::Gbk => "gbk",
            CandidateEncoding::Gb2312 => "gb2312",
            CandidateEncoding::Latin1 => "latin1",
        }
    }

    /// Strict decode: `None` when the bytes are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<Cow<'_, str>> {
        const BOM: &[u8] = b"\xEF\xBB\xBF";
        match self {
            CandidateEncoding::Utf8 => {
                if bytes.starts_with(BOM) {
                    return None;
                }
                strict(UTF_8, bytes)
            }
            CandidateEncoding::Utf8Sig => {
                strict(UTF_8, bytes.strip_prefix(BOM).unwrap_or(bytes))
            }
            CandidateEncoding::Gbk | CandidateEncoding::Gb2312 => strict(GBK, bytes),
            CandidateEncoding::Latin1 => strict(WINDOWS_1252, bytes),
        }
    }
}

fn strict<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
    encoding.decode_without_bom_handling_and_without_replacement(bytes)
}

impl fmt::Display for CandidateEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CandidateEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(CandidateEncoding::Utf8),
            "utf-8-sig" | "utf8-sig" => Ok(CandidateEncoding::Utf8Sig),
            "gbk" | "cp936" => Ok(CandidateEncoding::Gbk),
            "gb2312" => Ok(CandidateEncoding::Gb2312),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(CandidateEncoding::Latin1),
            other => Err(format!("unknown encoding '{other}'")),
        }
    }
}

impl TryFrom<String> for CandidateEncoding {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CandidateEncoding> for String {
    fn from(e: CandidateEncoding) -> String {
        e.label().to_string()
    }
}

/// Outcome of running a parser over every candidate encoding.
#[derive(Debug)]
pub enum DecodeAttempt<T> {
    Decoded {
        encoding: CandidateEncoding,
        value: T,
    },
    Exhausted {
        tried: Vec<CandidateEncoding>,
    },
}

/// Decode `bytes` with each encoding in turn and hand the text to `parse`.
/// The first encoding that both decodes and parses wins.
pub fn decode_with<T, E: fmt::Display>(
    bytes: &[u8],
    encodings: &[CandidateEncoding],
    mut parse: impl FnMut(&str) -> std::result::Result<T, E>,
) -> DecodeAttempt<T> {
    let mut tried = Vec::with_capacity(encodings.len());
    for &encoding in encodings {
        tried.push(encoding);
        let Some(text) = encoding.decode(bytes) else {
            log::debug!("{encoding}: input is not valid in this encoding");
            continue;
        };
        match parse(&text) {
            Ok(value) => return DecodeAttempt::Decoded { encoding, value },
            Err(e) => log::debug!("{encoding}: decoded but failed to parse: {e}"),
        }
    }
    DecodeAttempt::Exhausted { tried }
}

/// Reads delimited recordings whose text encoding is not known up front.
///
/// The timestamp column is always the **last** column of the table. This is a
/// precondition on the input format, not something the loader infers.
#[derive(Debug, Clone)]
pub struct TabularLoader {
    encodings: Vec<CandidateEncoding>,
    delimiter: u8,
}

impl Default for TabularLoader {
    fn default() -> Self {
        Self {
            encodings: CandidateEncoding::DEFAULT_ORDER.to_vec(),
            delimiter: b',',
        }
    }
}

impl TabularLoader {
    pub fn new(settings: &LoaderSettings) -> Result<Self> {
        Ok(Self {
            encodings: settings.encodings.clone(),
            delimiter: settings.delimiter_byte()?,
        })
    }

    /// Column names only. Reads the first line from disk and nothing else, so
    /// the header must not contain quoted line breaks.
    pub fn read_columns(&self, path: &Path) -> Result<Vec<String>> {
        let file = File::open(path).map_err(|e| SimplexError::io(path, e))?;
        let mut line = Vec::new();
        BufReader::new(file)
            .read_until(b'\n', &mut line)
            .map_err(|e| SimplexError::io(path, e))?;
        self.columns_from_bytes(path, &line)
    }

    /// Load `lead` and the trailing timestamp column as two equal-length series.
    pub fn load(&self, path: &Path, lead: &str) -> Result<RawSeries> {
        let bytes = fs::read(path).map_err(|e| SimplexError::io(path, e))?;
        let columns = self.columns_from_bytes(path, header_line(&bytes))?;
        let lead_idx = columns
            .iter()
            .position(|c| c == lead)
            .ok_or_else(|| SimplexError::ColumnNotFound {
                column: lead.to_string(),
            })?;
        let time_idx = columns.len() - 1;

        let (encoding, (amplitude_cells, time_cells)) =
            match decode_with(&bytes, &self.encodings, |text| {
                self.read_two_columns(text, lead_idx, time_idx)
            }) {
                DecodeAttempt::Decoded { encoding, value } => (encoding, value),
                DecodeAttempt::Exhausted { tried } => {
                    return Err(SimplexError::Decoding {
                        path: path.to_path_buf(),
                        tried,
                    })
                }
            };
        log::debug!(
            "{}: read {} rows as {}",
            path.display(),
            time_cells.len(),
            encoding
        );

        let timestamps = time_cells
            .iter()
            .enumerate()
            .map(|(row, cell)| parse_timestamp(row + 1, cell))
            .collect::<Result<Vec<_>>>()?;
        let amplitude = amplitude_cells.iter().map(|c| parse_sample(c)).collect();

        Ok(RawSeries {
            lead: lead.to_string(),
            time_column: columns[time_idx].clone(),
            timestamps,
            amplitude,
        })
    }

    fn columns_from_bytes(&self, path: &Path, bytes: &[u8]) -> Result<Vec<String>> {
        let columns = match decode_with(bytes, &self.encodings, |text| self.read_header(text)) {
            DecodeAttempt::Decoded { value, .. } => value,
            DecodeAttempt::Exhausted { tried } => {
                return Err(SimplexError::Decoding {
                    path: path.to_path_buf(),
                    tried,
                })
            }
        };
        Ok(columns)
    }

    fn reader<'a>(&self, text: &'a str) -> csv::Reader<&'a [u8]> {
        ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_reader(text.as_bytes())
    }

    fn read_header(&self, text: &str) -> csv::Result<Vec<String>> {
        let mut reader = self.reader(text);
        let headers = reader.headers()?;
        Ok(headers.iter().map(|h| h.to_string()).collect())
    }

    fn read_two_columns(
        &self,
        text: &str,
        lead_idx: usize,
        time_idx: usize,
    ) -> csv::Result<(Vec<String>, Vec<String>)> {
        let mut reader = self.reader(text);
        let mut amplitude = Vec::new();
        let mut time = Vec::new();
        for record in reader.records() {
            let record = record?;
            amplitude.push(record.get(lead_idx).unwrap_or("").to_string());
            time.push(record.get(time_idx).unwrap_or("").to_string());
        }
        Ok((amplitude, time))
    }
}

/// Bytes up to and including the first `\n`. Safe for every candidate
/// encoding since none of them uses 0x0A inside a multi-byte sequence.
fn header_line(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == b'\n') {
        Some(end) => &bytes[..=end],
        None => bytes,
    }
}

fn parse_timestamp(row: usize, cell: &str) -> Result<f64> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| SimplexError::InvalidTimestamp {
            row,
            value: cell.to_string(),
        })
}

/// Empty or unparseable amplitude cells become NaN for the conditioner.
fn parse_sample(cell: &str) -> f64 {
    cell.trim().parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_bytes(bytes: &[u8]) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn loads_lead_and_last_column() {
        let file = write_bytes(b"I,II,time\n0.1,1.5,0.0\n0.2,,0.5\n0.3,2.5,1.0\n");
        let series = TabularLoader::default().load(file.path(), "II").unwrap();
        assert_eq!(series.time_column, "time");
        assert_eq!(series.timestamps, vec![0.0, 0.5, 1.0]);
        assert_eq!(series.amplitude[0], 1.5);
        assert!(series.amplitude[1].is_nan());
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn missing_lead_names_the_column() {
        let file = write_bytes(b"I,II,time\n1,2,0\n");
        let err = TabularLoader::default().load(file.path(), "V5").unwrap_err();
        match err {
            SimplexError::ColumnNotFound { column } => assert_eq!(column, "V5"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn gbk_header_is_decoded() {
        let (encoded, _, _) = GBK.encode("导联,时间\n1.0,0.0\n2.0,0.1\n");
        assert!(std::str::from_utf8(&encoded).is_err());
        let file = write_bytes(&encoded);
        let loader = TabularLoader::default();
        assert_eq!(loader.read_columns(file.path()).unwrap(), vec!["导联", "时间"]);
        let series = loader.load(file.path(), "导联").unwrap();
        assert_eq!(series.amplitude, vec![1.0, 2.0]);
        assert_eq!(series.time_column, "时间");
    }

    #[test]
    fn bom_is_stripped_from_first_column() {
        let file = write_bytes(b"\xEF\xBB\xBFII,time\n1.0,0.0\n");
        let columns = TabularLoader::default().read_columns(file.path()).unwrap();
        assert_eq!(columns, vec!["II", "time"]);
    }

    #[test]
    fn header_is_decoded_independently_of_the_body() {
        // UTF-8 header, then a row holding a byte no multi-byte candidate accepts
        let mut bytes = "导联,时间\n".as_bytes().to_vec();
        bytes.extend_from_slice(b"1.0\xFF,0.0\n");
        let file = write_bytes(&bytes);
        let columns = TabularLoader::default().read_columns(file.path()).unwrap();
        assert_eq!(columns, vec!["导联", "时间"]);
    }

    #[test]
    fn header_without_trailing_newline() {
        let file = write_bytes(b"II,time");
        let columns = TabularLoader::default().read_columns(file.path()).unwrap();
        assert_eq!(columns, vec!["II", "time"]);
    }

    #[test]
    fn ragged_rows_exhaust_every_encoding() {
        let file = write_bytes(b"II,time\n1.0,0.0\n2.0,0.1,9\n");
        let err = TabularLoader::default().load(file.path(), "II").unwrap_err();
        match err {
            SimplexError::Decoding { tried, .. } => {
                assert_eq!(tried, CandidateEncoding::DEFAULT_ORDER.to_vec())
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn bad_timestamp_reports_row() {
        let file = write_bytes(b"II,time\n1.0,0.0\n2.0,later\n");
        let err = TabularLoader::default().load(file.path(), "II").unwrap_err();
        assert!(matches!(err, SimplexError::InvalidTimestamp { row: 2, .. }));
    }

    #[test]
    fn decode_with_reports_first_success() {
        let attempt = decode_with(
            b"caf\xE9",
            &CandidateEncoding::DEFAULT_ORDER,
            |text| Ok::<_, String>(text.to_string()),
        );
        match attempt {
            DecodeAttempt::Decoded { encoding, value } => {
                // 0xE9 alone is invalid UTF-8 and an incomplete GBK sequence
                assert_eq!(encoding, CandidateEncoding::Latin1);
                assert_eq!(value, "café");
            }
            DecodeAttempt::Exhausted { .. } => panic!("latin1 accepts every byte"),
        }
    }

    #[test]
    fn encoding_labels_round_trip_through_config_strings() {
        for enc in CandidateEncoding::DEFAULT_ORDER {
            assert_eq!(enc.label().parse::<CandidateEncoding>().unwrap(), enc);
        }
        assert!("ebcdic".parse::<CandidateEncoding>().is_err());
    }
}
