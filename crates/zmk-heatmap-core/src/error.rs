use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeatmapError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML Parsing Error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Corrupt heatmap file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Keymap Error: {0}")]
    Keymap(String),

    #[error("Device Error: {0}")]
    Device(String),

    #[error("Cannot persist heatmap: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub type HmResult<T> = Result<T, HeatmapError>;
