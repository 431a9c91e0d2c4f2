// CSV row source: streaming, header-driven, delimiter-sniffed

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use taxgrid_vat::{Header, RawRow, TransformError};

const SNIFF_LINES: usize = 10;

/// A CSV file that can be read from the start any number of times.
///
/// Only one record is held in memory at a time.
#[derive(Debug, Clone)]
pub struct RowSource {
    path: PathBuf,
    delimiter: u8,
}

impl RowSource {
    /// Open `path`, sniffing the delimiter from its first lines.
    pub fn open(path: &Path) -> Result<Self, TransformError> {
        let sample = read_sample(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            delimiter: sniff_delimiter(&sample),
        })
    }

    /// Open `path` with a fixed delimiter.
    pub fn with_delimiter(path: &Path, delimiter: u8) -> Result<Self, TransformError> {
        File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            delimiter,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Start a fresh pass. Fails with `EmptyFile` if there is no header.
    pub fn rows(&self) -> Result<Rows, TransformError> {
        let file = File::open(&self.path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let names: Vec<String> = reader
            .byte_headers()
            .map_err(csv_error)?
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let name = decode_field(field);
                let name = if i == 0 {
                    name.trim_start_matches('\u{feff}').to_string()
                } else {
                    name
                };
                name.trim().to_string()
            })
            .collect();
        if names.is_empty() || names.iter().all(String::is_empty) {
            return Err(TransformError::EmptyFile);
        }

        Ok(Rows {
            reader,
            header: Arc::new(Header::new(names)),
            record: csv::ByteRecord::new(),
        })
    }
}

/// One pass over a [`RowSource`].
pub struct Rows {
    reader: csv::Reader<BufReader<File>>,
    header: Arc<Header>,
    record: csv::ByteRecord,
}

impl Rows {
    pub fn header(&self) -> &Header {
        &self.header
    }
}

impl Iterator for Rows {
    type Item = Result<RawRow, TransformError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_byte_record(&mut self.record) {
            Ok(true) => {
                let line = self.record.position().map_or(0, |p| p.line());
                let fields = self.record.iter().map(decode_field).collect();
                Some(Ok(RawRow::new(self.header.clone(), fields, line)))
            }
            Ok(false) => None,
            Err(e) => Some(Err(csv_error(e))),
        }
    }
}

fn csv_error(e: csv::Error) -> TransformError {
    let line = e.position().map_or(0, |p| p.line());
    match e.into_kind() {
        csv::ErrorKind::Io(io) => TransformError::Io(io),
        kind => TransformError::csv(line, format!("{kind:?}")),
    }
}

/// UTF-8 if valid, otherwise Windows-1252 (common for Excel-exported CSVs).
pub fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

fn read_sample(path: &Path) -> Result<String, TransformError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut sample = String::new();
    let mut line = Vec::new();
    for _ in 0..SNIFF_LINES {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        sample.push_str(&decode_field(&line));
    }
    Ok(sample)
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(SNIFF_LINES).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Must produce >1 field on the first line to be viable
        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // Score: (lines matching line 1's field count) * field count
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}
