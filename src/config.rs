use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::{SearchConfig, SearchOrder};
use crate::stubborn::ReductionKind;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CheckerConfig {
    #[serde(default)]
    pub reduction: ReductionKind,
    #[serde(default)]
    pub search: SearchOrder,
    #[serde(default)]
    pub state_limit: Option<usize>,
    #[serde(default = "default_closure_each")]
    pub closure_each: bool,
    #[serde(default)]
    pub record_graph: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            reduction: ReductionKind::default(),
            search: SearchOrder::default(),
            state_limit: None,
            closure_each: default_closure_each(),
            record_graph: false,
        }
    }
}

impl CheckerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: CheckerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            order: self.search,
            reduction: self.reduction,
            state_limit: self.state_limit,
            closure_each: self.closure_each,
            record_graph: self.record_graph,
        }
    }
}

// The analysis closes after every preset/postset request unless told otherwise.
fn default_closure_each() -> bool {
    true
}
