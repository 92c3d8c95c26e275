//! Immediate-callback test cases with teardown blocks.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{self, VerifyMode};
use crate::lifecycle::verify_unit;
use crate::location::SourceLocation;
use crate::report::{IssueSink, PanicSink};
use crate::structured_log::{self, SharedEmitter};
use crate::tracking::{Trackable, TrackingRegistry, VerificationPolicy};

type TeardownBlock = Box<dyn FnOnce() + Send>;

/// A test body plus the blocks to run after it, whatever its outcome.
///
/// ```
/// use std::sync::Arc;
/// use leakcheck::TestCase;
///
/// TestCase::new("parser_releases_buffers").run(|tc| {
///     let buffer = Arc::new(vec![0_u8; 64]);
///     tc.assert_deallocated_after_test(&buffer);
/// });
/// ```
pub struct TestCase {
    name: String,
    mode: VerifyMode,
    sink: Arc<dyn IssueSink>,
    log: Option<SharedEmitter>,
    blocks: Mutex<Vec<TeardownBlock>>,
}

impl TestCase {
    /// Test case reporting through [`PanicSink`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_sink(name, Arc::new(PanicSink::new()))
    }

    #[must_use]
    pub fn with_sink(name: impl Into<String>, sink: Arc<dyn IssueSink>) -> Self {
        Self {
            name: name.into(),
            mode: config::verify_mode(),
            sink,
            log: structured_log::global_emitter(),
            blocks: Mutex::new(Vec::new()),
        }
    }

    /// Override the `LEAKCHECK_MODE` setting.
    #[must_use]
    pub fn with_mode(mut self, mode: VerifyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Write JSONL records to `log` instead of the `LEAKCHECK_LOG` emitter.
    #[must_use]
    pub fn with_log(mut self, log: SharedEmitter) -> Self {
        self.log = Some(log);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `block` to run after the body. Blocks run last-in, first-out.
    pub fn add_teardown_block<F>(&self, block: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.blocks.lock().push(Box::new(block));
    }

    /// Fail the test if `candidate` is still allocated once the body has finished.
    ///
    /// Only a weak observation is captured; the teardown block evaluates it alone.
    #[track_caller]
    pub fn assert_deallocated_after_test<C: Trackable + ?Sized>(&self, candidate: &C) {
        let registry = TrackingRegistry::new();
        registry.register(
            candidate,
            VerificationPolicy::FailIfLeaked,
            SourceLocation::caller(),
        );

        let unit = self.name.clone();
        let mode = self.mode;
        let sink = Arc::clone(&self.sink);
        let log = self.log.clone();
        self.add_teardown_block(move || {
            let _ = verify_unit(&unit, &registry, mode, sink.as_ref(), log.as_ref());
        });
    }

    /// Run `body`, then every teardown block, then report.
    ///
    /// A panic from the body (or, failing that, from a teardown block) is resumed after the
    /// blocks have run and leak issues have been reported.
    pub fn run<F>(self, body: F)
    where
        F: FnOnce(&Self),
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&self)));
        let block_panic = self.run_teardown_blocks();

        let pending = outcome.err().or(block_panic);
        match pending {
            Some(payload) => {
                // The original failure wins; leak issues still reach stderr via the panic hook.
                let _ = panic::catch_unwind(AssertUnwindSafe(|| self.sink.finish()));
                panic::resume_unwind(payload);
            }
            None => self.sink.finish(),
        }
    }

    fn run_teardown_blocks(&self) -> Option<Box<dyn Any + Send>> {
        let mut first_panic = None;
        // Blocks may queue further blocks, so drain until empty. The lock is released before a
        // block runs.
        loop {
            let next = self.blocks.lock().pop();
            let Some(block) = next else {
                break;
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(block)) {
                first_panic.get_or_insert(payload);
            }
        }
        first_panic
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("pending_blocks", &self.blocks.lock().len())
            .finish()
    }
}
