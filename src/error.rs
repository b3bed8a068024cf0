use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Rule error: {0}")]
    Rules(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
