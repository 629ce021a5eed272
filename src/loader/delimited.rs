//! Delimited-text loader.
//!
//! The source is re-read from the start for every mapping, skipping
//! `header_count` leading rows each time.

use crate::loader::context::ExtractionContext;
use crate::loader::error::LoaderError;
use crate::loader::mapping::{Mapping, SourceKind};
use crate::loader::summary::{LoadSummary, MappingSummary};
use crate::loader::walker::MappingRun;
use crate::loader::Loader;
use crate::service::Service;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Dialect of the delimited source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelimitedFormat {
    pub delimiter: u8,
    pub quote: u8,
    pub escape: Option<u8>,
    pub double_quote: bool,
    /// Record terminator; `None` accepts `\r`, `\n` and `\r\n`
    pub terminator: Option<u8>,
    /// Drop spaces at the start of every field, before quotes are
    /// recognised, so `a, "x,y"` reads as `a` and `x,y`
    pub skip_initial_space: bool,
}

impl Default for DelimitedFormat {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            escape: None,
            double_quote: true,
            terminator: None,
            skip_initial_space: false,
        }
    }
}

impl DelimitedFormat {
    fn reader<R: Read>(&self, input: R) -> csv::Reader<R> {
        let terminator = match self.terminator {
            Some(byte) => csv::Terminator::Any(byte),
            None => csv::Terminator::CRLF,
        };
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .escape(self.escape)
            .double_quote(self.double_quote)
            .terminator(terminator)
            .from_reader(input)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldState {
    Start,
    Unquoted,
    Quoted,
    Escaped,
    /// A quote seen inside a quoted field: closing, or the first half of a
    /// doubled quote
    QuoteInQuoted,
}

/// Input filter dropping the spaces that open a field. Tracks quoting so
/// spaces inside quoted fields are kept.
struct SkipInitialSpace<R> {
    inner: R,
    format: DelimitedFormat,
    state: FieldState,
}

impl<R: Read> SkipInitialSpace<R> {
    fn new(inner: R, format: &DelimitedFormat) -> Self {
        Self {
            inner,
            format: format.clone(),
            state: FieldState::Start,
        }
    }

    fn ends_record(&self, byte: u8) -> bool {
        match self.format.terminator {
            Some(terminator) => byte == terminator,
            None => byte == b'\n' || byte == b'\r',
        }
    }

    /// Advance over one byte; false when the byte is dropped
    fn step(&mut self, byte: u8) -> bool {
        let boundary = byte == self.format.delimiter || self.ends_record(byte);
        self.state = match self.state {
            FieldState::Start if byte == b' ' => return false,
            FieldState::Start if byte == self.format.quote => FieldState::Quoted,
            FieldState::Start | FieldState::Unquoted if boundary => FieldState::Start,
            FieldState::Start | FieldState::Unquoted => FieldState::Unquoted,
            FieldState::Quoted if self.format.escape == Some(byte) => FieldState::Escaped,
            FieldState::Quoted if byte == self.format.quote => FieldState::QuoteInQuoted,
            FieldState::Quoted => FieldState::Quoted,
            FieldState::Escaped => FieldState::Quoted,
            FieldState::QuoteInQuoted if byte == self.format.quote && self.format.double_quote => {
                FieldState::Quoted
            }
            FieldState::QuoteInQuoted if boundary => FieldState::Start,
            FieldState::QuoteInQuoted => FieldState::Unquoted,
        };
        true
    }
}

impl<R: Read> Read for SkipInitialSpace<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.inner.read(buf)?;
            if n == 0 {
                return Ok(0);
            }
            let mut kept = 0;
            for i in 0..n {
                let byte = buf[i];
                if self.step(byte) {
                    buf[kept] = byte;
                    kept += 1;
                }
            }
            // A chunk of nothing but dropped spaces is not end of input.
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}

#[derive(Debug, Clone)]
enum DelimitedSource {
    File(PathBuf),
    Text(String),
}

impl DelimitedSource {
    fn describe(&self) -> String {
        match self {
            DelimitedSource::File(path) => path.display().to_string(),
            DelimitedSource::Text(_) => "<inline>".to_string(),
        }
    }

    fn open(&self) -> Result<Box<dyn Read + '_>, LoaderError> {
        match self {
            DelimitedSource::File(path) => {
                let file = File::open(path).map_err(|source| LoaderError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Ok(Box::new(io::BufReader::new(file)))
            }
            DelimitedSource::Text(text) => Ok(Box::new(text.as_bytes())),
        }
    }
}

/// Loader for delimited text files
///
/// # Example
///
/// ```
/// use dynaload::loader::{DelimitedLoader, Loader, Mapping, ValueElement};
/// use dynaload::service::MemoryService;
/// use dynaload::types::{Action, ComponentType, DataType};
///
/// let mut loader = DelimitedLoader::from_text("name,city\nada,london\n").header_count(1);
/// loader
///     .add_mapping(Mapping::new(
///         Action::named("lives_in"),
///         vec![
///             ValueElement::column(0, DataType::String, ComponentType::Who).into(),
///             ValueElement::column(1, DataType::String, ComponentType::Where).into(),
///         ],
///     ))
///     .unwrap();
///
/// let mut service = MemoryService::new();
/// let summary = loader.run(&mut service).unwrap();
/// assert_eq!(summary.instances_pushed(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct DelimitedLoader {
    source: DelimitedSource,
    header_count: usize,
    format: DelimitedFormat,
    mappings: Vec<Mapping>,
}

impl DelimitedLoader {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self::with_source(DelimitedSource::File(path.as_ref().to_path_buf()))
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::with_source(DelimitedSource::Text(text.into()))
    }

    fn with_source(source: DelimitedSource) -> Self {
        Self {
            source,
            header_count: 0,
            format: DelimitedFormat::default(),
            mappings: Vec::new(),
        }
    }

    /// Number of leading rows to skip
    pub fn header_count(mut self, header_count: usize) -> Self {
        self.header_count = header_count;
        self
    }

    pub fn format(mut self, format: DelimitedFormat) -> Self {
        self.format = format;
        self
    }

    /// Validate and add a mapping
    pub fn add_mapping(&mut self, mapping: Mapping) -> Result<(), LoaderError> {
        mapping.validate(SourceKind::Delimited, &[])?;
        self.mappings.push(mapping);
        Ok(())
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Read every data row of the source
    pub fn rows(&self) -> Result<Vec<Vec<String>>, LoaderError> {
        let mut rows = Vec::new();
        self.for_each_row(|row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    fn for_each_row<F>(&self, mut handle: F) -> Result<(), LoaderError>
    where
        F: FnMut(Vec<String>) -> Result<(), LoaderError>,
    {
        let input = self.source.open()?;
        let input: Box<dyn Read + '_> = if self.format.skip_initial_space {
            Box::new(SkipInitialSpace::new(input, &self.format))
        } else {
            input
        };
        let mut reader = self.format.reader(input);
        let mut record = csv::StringRecord::new();
        let mut row_count = 0usize;

        loop {
            let more = reader
                .read_record(&mut record)
                .map_err(|source| LoaderError::Source {
                    path: self.source.describe(),
                    source,
                })?;
            if !more {
                return Ok(());
            }
            row_count += 1;
            if row_count <= self.header_count {
                continue;
            }

            handle(record.iter().map(str::to_string).collect())?;
        }
    }

    fn run_mapping(
        &self,
        service: &mut dyn Service,
        mapping: &Mapping,
    ) -> Result<MappingSummary, LoaderError> {
        let mut run = MappingRun::start(service, mapping)?;
        let ctx = ExtractionContext::empty();
        self.for_each_row(|row| run.process(&row, &ctx))?;
        run.summary_mut().passes += 1;
        run.finish()
    }
}

impl Loader for DelimitedLoader {
    fn run(&mut self, service: &mut dyn Service) -> Result<LoadSummary, LoaderError> {
        tracing::info!(
            "Loading {} with {} mapping(s)",
            self.source.describe(),
            self.mappings.len()
        );

        let mut summary = LoadSummary::start();
        for mapping in &self.mappings {
            summary.mappings.push(self.run_mapping(service, mapping)?);
        }
        Ok(summary.finish())
    }

    fn validate(&self) -> Result<(), LoaderError> {
        for mapping in &self.mappings {
            mapping.validate(SourceKind::Delimited, &[])?;
        }
        // Make sure the source opens and parses.
        self.for_each_row(|_| Ok(()))
    }

    fn mapping_count(&self) -> usize {
        self.mappings.len()
    }
}
