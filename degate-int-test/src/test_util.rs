use degate::config::{DegateConfig, TileStorage};
use degate::errors::{DegateError, DegateResult, ErrorKind};
use degate_tiles::{GlobalTileCache, Pixel, RgbaPixel};
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Runs `test` between `before` and `after`.
///
/// `after` runs even if the test fails or panics. A failure is reported with
/// the phase it happened in and then re-raised as a panic.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> DegateResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> DegateResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> DegateResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    let start_time = Instant::now();
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };

    let test_ctx = ctx.clone();
    // the context holds locks, which are not UnwindSafe
    let result = std::panic::catch_unwind(AssertUnwindSafe(move || test(test_ctx)));
    let after_result = after(ctx);
    let elapsed = start_time.elapsed();

    let failure = match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("Test failed: {:?}", e)),
        Err(panic_err) => {
            let msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            Some(format!("Panic: {}", msg))
        }
    };

    if let Some(failure) = failure {
        eprintln!("\n==================== TEST FAILED ====================");
        eprintln!("{} (after {:?})", failure, elapsed);
        let backtrace = Backtrace::capture().to_string();
        if !backtrace.is_empty() && !backtrace.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", backtrace);
        }
        eprintln!("=====================================================\n");
        panic!("{}", failure);
    }

    if let Err(e) = after_result {
        panic!("After run failed: {:?}", e);
    }
}

/// Scratch directory, configuration and shared tile budget for one test.
#[derive(Clone)]
pub struct TestContext {
    dir: Arc<TempDir>,
    config: DegateConfig,
    rgba_cache: Arc<GlobalTileCache<RgbaPixel>>,
}

impl TestContext {
    pub fn new(dir: TempDir, config: DegateConfig, rgba_cache: Arc<GlobalTileCache<RgbaPixel>>) -> Self {
        Self {
            dir: Arc::new(dir),
            config,
            rgba_cache,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A path below the scratch directory.
    pub fn child(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn config(&self) -> &DegateConfig {
        &self.config
    }

    pub fn rgba_cache(&self) -> Arc<GlobalTileCache<RgbaPixel>> {
        Arc::clone(&self.rgba_cache)
    }
}

/// Bytes of one tile of `P` under `config`.
pub fn tile_bytes<P: Pixel>(config: &DegateConfig) -> u64 {
    let tile_size = config.tile_size() as u64;
    tile_size * tile_size * P::SIZE as u64
}

fn scratch_dir() -> DegateResult<TempDir> {
    tempfile::Builder::new()
        .prefix("degate-it-")
        .tempdir()
        .map_err(|e| DegateError::new(&format!("Failed to create scratch directory: {}", e), ErrorKind::IOError))
}

/// Context with 16-pixel tiles in temp files below the scratch directory,
/// synchronous loading and room for `tiles` RGBA tiles.
pub fn create_tile_context(tiles: u64) -> DegateResult<TestContext> {
    let dir = scratch_dir()?;
    let config = DegateConfig::new();
    config.set_tile_width_exp(4)?;
    config.set_tile_storage(TileStorage::TempFile);
    config.set_temp_directory(dir.path().join("tmp"));
    config.set_async_tile_loading(false);

    let budget = tiles * tile_bytes::<RgbaPixel>(&config);
    let rgba_cache = Arc::new(GlobalTileCache::with_max_memory(budget));
    Ok(TestContext::new(dir, config, rgba_cache))
}

/// Like [`create_tile_context`] but with background loading enabled.
pub fn create_async_tile_context(tiles: u64) -> DegateResult<TestContext> {
    let ctx = create_tile_context(tiles)?;
    ctx.config().set_async_tile_loading(true);
    Ok(ctx)
}

/// Checks that every tile has been handed back to the budget. Background
/// loads may still be finishing, so this waits a little before failing.
pub fn cleanup(ctx: TestContext) -> DegateResult<()> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while ctx.rgba_cache.allocated_memory() != 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    let allocated = ctx.rgba_cache.allocated_memory();
    if allocated != 0 {
        ctx.rgba_cache.log_table();
        return Err(DegateError::new(
            &format!("{} bytes of tile memory still allocated", allocated),
            ErrorKind::InternalError,
        ));
    }
    Ok(())
}
