use thiserror::Error;

/// Error surface for server startup, configuration and runtime.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("render error: {0}")]
    Render(#[from] grimoire_renderer::RenderError),

    #[error("task failure: {0}")]
    Task(String),
}

pub(crate) fn io_err(context: impl Into<String>, source: std::io::Error) -> ServerError {
    ServerError::Io {
        context: context.into(),
        source,
    }
}
