use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal loop errors. Anything returned here stops [`EventLoop::run`](crate::EventLoop::run).
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("failed to build the I/O runtime")]
    Runtime(#[source] io::Error),

    #[error("failed to read {}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
