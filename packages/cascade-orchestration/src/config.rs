use crate::error::{CascadeError, Result};
use serde::{Deserialize, Serialize};

/// Run-time options, resolved once before graph construction.
///
/// Options arrive as ordered (name, value) pairs; when a name repeats the
/// later entry wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeOptions {
    /// Name of the node the cascade starts from
    pub root_node_name: String,
    /// Worker pool size for the parallel executor
    pub max_number_cpu: usize,
    /// Name of the root split reference; None when splitting is unused
    pub root_split_reference_name: Option<String>,
}

impl CascadeOptions {
    /// Resolve options from (name, value) entries.
    ///
    /// `root_node_name` is required; `max_number_cpu` defaults to the
    /// machine core count; an unrecognized option name is fatal.
    pub fn from_entries<'a, I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut root_node_name = None;
        let mut max_number_cpu = num_cpus::get();
        let mut root_split_reference_name = None;

        for (name, value) in entries {
            match name {
                "root_node_name" => root_node_name = Some(value.to_string()),
                "max_number_cpu" => {
                    max_number_cpu = value.parse().map_err(|_| {
                        CascadeError::config(format!(
                            "max_number_cpu is not a positive integer: {}",
                            value
                        ))
                    })?;
                    if max_number_cpu == 0 {
                        return Err(CascadeError::config("max_number_cpu must be at least 1"));
                    }
                }
                "root_split_reference_name" => {
                    root_split_reference_name = Some(value.to_string())
                }
                other => {
                    return Err(CascadeError::config(format!(
                        "unrecognized option name: {}",
                        other
                    )));
                }
            }
        }

        let root_node_name = root_node_name
            .ok_or_else(|| CascadeError::config("required option root_node_name is missing"))?;

        Ok(Self {
            root_node_name,
            max_number_cpu,
            root_split_reference_name,
        })
    }
}
