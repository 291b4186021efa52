use thiserror::Error;

#[derive(Error, Debug)]
pub enum DnaError {
    #[error(
        "no customers with at least {min_transactions} transactions \
         ({customers} customers across {transactions} transactions)"
    )]
    EmptyCohort {
        transactions: usize,
        customers: usize,
        min_transactions: u32,
    },

    #[error("missing required field(s): {}", fields.join(", "))]
    MissingRequiredField { fields: Vec<String> },

    #[error("cannot compute cut points for '{column}': no usable values")]
    InsufficientData { column: String },

    #[error("malformed external table '{table}': {reason}")]
    MalformedExternalTable { table: String, reason: String },

    #[error("invalid record on line {line}: {reason}")]
    InvalidRecord { line: u64, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),
}

impl DnaError {
    pub fn missing(field: impl Into<String>) -> Self {
        DnaError::MissingRequiredField {
            fields: vec![field.into()],
        }
    }
}

pub type DnaResult<T> = Result<T, DnaError>;
