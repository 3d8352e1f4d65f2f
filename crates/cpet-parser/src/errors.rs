use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("{parser} format mismatch: {reason}")]
    FormatMismatch {
        parser: &'static str,
        reason: String,
    },

    #[error("{parser} header row {row_index} invalid: {message}")]
    InvalidHeader {
        parser: &'static str,
        row_index: usize,
        message: String,
    },

    #[error("{parser} export is missing required column '{column}'")]
    MissingColumn {
        parser: &'static str,
        column: &'static str,
    },

    #[error("{parser} column '{column}' is ambiguous: {message}")]
    AmbiguousColumn {
        parser: &'static str,
        column: String,
        message: String,
    },

    #[error("{parser} column '{column}' has unrecognised unit '{unit}'")]
    UnknownUnit {
        parser: &'static str,
        column: String,
        unit: String,
    },

    #[error("{parser} section '{section}' invalid: {message}")]
    InvalidSection {
        parser: &'static str,
        section: String,
        message: String,
    },

    #[error("{parser} CSV error: {source}")]
    Csv {
        parser: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("{parser} data row {line_index} invalid: {message}")]
    DataRow {
        parser: &'static str,
        line_index: usize,
        message: String,
    },

    #[error("{parser} validation error: {message}")]
    Validation {
        parser: &'static str,
        message: String,
    },

    #[error("{parser} export did not contain any data rows")]
    EmptyData { parser: &'static str },

    #[error("export is not valid UTF-8: invalid byte sequence at offset {valid_up_to}")]
    InvalidEncoding { valid_up_to: usize },

    #[error("{parser} export holds more than {limit} breaths (line {line_index})")]
    TooManyBreaths {
        parser: &'static str,
        limit: usize,
        line_index: usize,
    },
}

impl ParserError {
    /// Column or section the failure points at, when there is one.
    pub fn offending_field(&self) -> Option<&str> {
        match self {
            ParserError::MissingColumn { column, .. } => Some(column),
            ParserError::AmbiguousColumn { column, .. } | ParserError::UnknownUnit { column, .. } => {
                Some(column.as_str())
            }
            ParserError::InvalidSection { section, .. } => Some(section.as_str()),
            _ => None,
        }
    }

    pub fn parser(&self) -> &'static str {
        match self {
            ParserError::InvalidEncoding { .. } => "DECODE",
            ParserError::FormatMismatch { parser, .. }
            | ParserError::InvalidHeader { parser, .. }
            | ParserError::MissingColumn { parser, .. }
            | ParserError::AmbiguousColumn { parser, .. }
            | ParserError::UnknownUnit { parser, .. }
            | ParserError::InvalidSection { parser, .. }
            | ParserError::Csv { parser, .. }
            | ParserError::DataRow { parser, .. }
            | ParserError::Validation { parser, .. }
            | ParserError::TooManyBreaths { parser, .. }
            | ParserError::EmptyData { parser } => parser,
        }
    }
}
