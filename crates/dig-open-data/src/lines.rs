//! # Resumable Line Reading
//!
//! [`ResumableLines`] yields the lines of a dataset, surviving mid-stream
//! failures: the source is re-opened from the start, the lines already handed
//! out are read and discarded, and reading carries on. A line cut short by the
//! failure is dropped and read again in full, so each line is delivered exactly
//! once and in order.

use std::collections::BTreeMap;
use std::io::{self, BufRead};

use tracing::{debug, warn};

use crate::error::{DataError, Result};
use crate::opener::Opener;
use crate::stream::DataStream;

/// Iterator over the lines of a URI, newline terminators included
pub struct ResumableLines<'a> {
    opener: &'a Opener,
    uri: String,
    stream: Option<DataStream>,
    delivered: usize,
    retries_left: u32,
    done: bool,
}

impl<'a> ResumableLines<'a> {
    pub(crate) fn new(opener: &'a Opener, uri: &str) -> Self {
        Self {
            opener,
            uri: uri.to_string(),
            stream: None,
            delivered: 0,
            retries_left: opener.config().retries,
            done: false,
        }
    }

    /// Number of lines handed out so far
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.reopen()?,
        };
        let stream = self.stream.insert(stream);

        let mut line = String::new();
        if stream.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// Open the source and skip past every line already delivered
    fn reopen(&self) -> Result<DataStream> {
        let mut stream = self.opener.open(&self.uri)?;
        if self.delivered == 0 {
            return Ok(stream);
        }

        let mut skipped = 0;
        let mut discard = Vec::new();
        while skipped < self.delivered {
            discard.clear();
            if stream.read_until(b'\n', &mut discard)? == 0 {
                return Err(DataError::ReplayShortfall {
                    expected: self.delivered,
                    found: skipped,
                });
            }
            skipped += 1;
        }

        debug!(uri = %self.uri, skipped, "Resumed after replaying delivered lines");
        Ok(stream)
    }
}

impl Iterator for ResumableLines<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.read_line() {
                Ok(Some(line)) => {
                    self.delivered += 1;
                    return Some(Ok(line));
                }
                Ok(None) => {
                    self.done = true;
                    self.stream = None;
                    return None;
                }
                Err(err) => {
                    self.stream = None;
                    if self.retries_left == 0 || !is_replayable(&err) {
                        self.done = true;
                        return Some(Err(err));
                    }
                    self.retries_left -= 1;
                    warn!(
                        uri = %self.uri,
                        delivered = self.delivered,
                        retries_left = self.retries_left,
                        error = %err,
                        "Line stream failed, reopening"
                    );
                }
            }
        }
    }
}

/// Undecodable bytes fail the same way on every pass, so they are not replayed
fn is_replayable(err: &DataError) -> bool {
    !matches!(err, DataError::IoError(e) if e.kind() == io::ErrorKind::InvalidData)
}

/// Rows of a delimited text file keyed by its header line.
///
/// Blank lines are skipped. Short rows are padded with empty strings and
/// fields beyond the header are ignored.
pub struct TsvRecords<'a> {
    lines: ResumableLines<'a>,
    delimiter: char,
    header: Option<Vec<String>>,
}

impl<'a> TsvRecords<'a> {
    pub(crate) fn new(lines: ResumableLines<'a>, delimiter: char) -> Self {
        Self {
            lines,
            delimiter,
            header: None,
        }
    }

    /// Column names, once the header line has been read
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    fn next_fields(&mut self) -> Option<Result<Vec<String>>> {
        for line in self.lines.by_ref() {
            let line = match line {
                Ok(line) => line,
                Err(err) => return Some(Err(err)),
            };
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            return Some(Ok(line.split(self.delimiter).map(str::to_string).collect()));
        }
        None
    }
}

impl Iterator for TsvRecords<'_> {
    type Item = Result<BTreeMap<String, String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.header.is_none() {
            match self.next_fields()? {
                Ok(header) => self.header = Some(header),
                Err(err) => return Some(Err(err)),
            }
        }

        let fields = match self.next_fields()? {
            Ok(fields) => fields,
            Err(err) => return Some(Err(err)),
        };
        let header = self.header.as_deref().unwrap_or_default();

        let mut values = fields.into_iter();
        Some(Ok(header
            .iter()
            .map(|column| (column.clone(), values.next().unwrap_or_default()))
            .collect()))
    }
}
