//! Errors of loading configs and inventory snapshots.

use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Json(serde_json::Error),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "can't read file: {}", e),
            LoadError::Yaml(e) => write!(f, "can't parse YAML: {}", e),
            LoadError::Json(e) => write!(f, "can't parse JSON: {}", e),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            LoadError::Yaml(e) => Some(e),
            LoadError::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<serde_yaml::Error> for LoadError {
    fn from(e: serde_yaml::Error) -> Self {
        LoadError::Yaml(e)
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(e: serde_json::Error) -> Self {
        LoadError::Json(e)
    }
}
