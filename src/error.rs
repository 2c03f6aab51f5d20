use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("edge {from} -> {to} references unknown node `{missing}`")]
    UnknownNode {
        from: String,
        to: String,
        missing: String,
    },

    #[error("graph contains a cycle through `{0}`")]
    Cycle(String),
}

/// Rejections raised while turning a flow document into a graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate node id `{id}` in flow `{flow}`")]
    DuplicateNode { flow: String, id: String },

    #[error("edge {from} -> {to} in flow `{flow}` references unknown node `{missing}`")]
    UnknownEndpoint {
        flow: String,
        from: String,
        to: String,
        missing: String,
    },

    #[error("flow `{flow}` contains a cycle through `{node}`")]
    Cycle { flow: String, node: String },

    #[error("layout of flow `{flow}` failed: {source}")]
    Layout {
        flow: String,
        #[source]
        source: LayoutError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] json5::Error),
}
