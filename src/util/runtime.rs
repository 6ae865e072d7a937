use std::{future::Future, io, sync::Arc};

use tokio::runtime::{Builder, Runtime};

/// Runs async SDK futures to completion for synchronous callers.
///
/// Must not be used from inside another tokio runtime.
#[derive(Clone)]
pub struct Blocking {
    runtime: Arc<Runtime>,
}

impl Blocking {
    pub fn new() -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("objectgw-io")
            .build()?;

        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
