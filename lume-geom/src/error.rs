//! Error types for the geometry compiler

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] bincode::Error),

    #[error("Descriptor parse error: {0}")]
    Descriptor(#[from] toml::de::Error),

    #[error("Descriptor validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    #[error("Import failed: {0}")]
    Import(String),

    #[error("Mesh optimizer error: {0}")]
    Optimizer(String),

    #[error("Too many entries in the {table} table: {count}")]
    TableOverflow { table: &'static str, count: usize },

    #[error("Invalid geometry resource: {0}")]
    InvalidResource(String),
}

pub type Result<T> = std::result::Result<T, Error>;
