use std::path::PathBuf;

pub enum Command {
    /// Compile a JSON query model.
    Compile {
        model: PathBuf,
    },
    /// Compile a model with an EXPLAIN prefix.
    Explain {
        model: PathBuf,
    },
    /// Execute a model against a canned store response (a `QueryResponse` JSON file).
    Run {
        model: PathBuf,
        response: PathBuf,
        tracked: bool,
    },
    /// Print the effective context configuration.
    Config,
}
