//! Materialization of GPU-delivered query results.
//!
//! A result delivered over IPC arrives as a [`HandleBundle`]: a device memory
//! handle for the data and a shared-memory segment for the schema. The
//! [`Materializer`] turns the bundle into a [`GpuDataFrame`]:
//!
//! 1. attach the segment, copy the schema stream out, detach;
//! 2. parse the schema and recover dictionary values;
//! 3. open the device handle, wait for the producer, map it as a byte array;
//! 4. slice the array into typed columns and install them into a frame.
//!
//! Everything runs on the calling thread. Step 3 blocks until the device is
//! done and cannot be cancelled; [`Materializer::materialize_async`] moves the
//! whole call to a blocking worker for callers that need to stop waiting.

use std::sync::Arc;

use arrow_interop::{recover_schema, RecoveryOutcome, SchemaRecovery};
use gpu_memory_manager::{load_schema_bytes, open_device_array, DeviceIpc, SharedMemory};
use tracing::{debug, info, warn};

pub mod assembler;
pub mod device_reader;
pub mod error;
pub mod frame;
pub mod handle;

pub use device_reader::DeviceReader;
pub use error::{MaterializeError, Result};
pub use frame::{GpuDataFrame, MaterializedColumn};
pub use handle::HandleBundle;

/// What to do when the schema stream yields no dictionary batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DictionaryFallback {
    /// Continue with plain index columns.
    Silent,
    /// Continue with plain index columns and log a warning.
    #[default]
    Warn,
    /// Fail with [`MaterializeError::DictionaryRecovery`].
    Error,
}

#[derive(Debug, Clone)]
pub struct MaterializeConfig {
    pub dictionary_fallback: DictionaryFallback,
    /// Largest schema segment accepted from a handle bundle (bytes)
    pub max_schema_bytes: usize,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            dictionary_fallback: DictionaryFallback::Warn,
            max_schema_bytes: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// Turns handle bundles into device-resident frames.
pub struct Materializer {
    shm: Arc<dyn SharedMemory>,
    device: Arc<dyn DeviceIpc>,
    config: MaterializeConfig,
}

impl Materializer {
    pub fn new(
        shm: Arc<dyn SharedMemory>,
        device: Arc<dyn DeviceIpc>,
        config: MaterializeConfig,
    ) -> Self {
        Self { shm, device, config }
    }

    pub fn config(&self) -> &MaterializeConfig {
        &self.config
    }

    /// Materialize one result. The bundle ends up as the frame's provenance.
    ///
    /// Attach and open failures abort the call; the schema segment is
    /// detached on every path once it was attached.
    pub fn materialize(&self, bundle: HandleBundle) -> Result<GpuDataFrame> {
        info!(
            "Materializing GPU result: {} schema bytes in {}",
            bundle.shm_size, bundle.shm_handle
        );

        let recovery = self.recover(&bundle)?;
        let device = open_device_array(self.device.as_ref(), &bundle.device_handle)?;
        let reader = DeviceReader::bind(&recovery.schema, device)?;

        let mut frame = assembler::assemble(reader, &recovery.memo);
        frame.set_provenance(bundle);

        info!(
            "Materialized {} columns x {} rows ({} dictionary-encoded)",
            frame.num_columns(),
            frame.num_rows(),
            recovery.memo.len()
        );
        Ok(frame)
    }

    /// [`materialize`](Self::materialize) on a blocking worker thread.
    /// Dropping the future abandons the result but not the device wait.
    pub async fn materialize_async(self: &Arc<Self>, bundle: HandleBundle) -> Result<GpuDataFrame> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.materialize(bundle))
            .await
            .map_err(|e| MaterializeError::Task(e.to_string()))?
    }

    fn recover(&self, bundle: &HandleBundle) -> Result<SchemaRecovery> {
        if bundle.shm_size > self.config.max_schema_bytes {
            return Err(MaterializeError::SchemaTooLarge {
                size: bundle.shm_size,
                limit: self.config.max_schema_bytes,
            });
        }

        let (bytes, guard) = load_schema_bytes(self.shm.as_ref(), bundle.shm_handle, bundle.shm_size)?;
        if let Err(e) = guard.release() {
            warn!("{}", e);
        }

        let recovery = recover_schema(&bytes);
        if let RecoveryOutcome::NoDictionaries { reason } = &recovery.outcome {
            match self.config.dictionary_fallback {
                DictionaryFallback::Silent => {
                    debug!("No dictionary batches recovered: {}", reason)
                }
                DictionaryFallback::Warn => {
                    warn!("No dictionary batches recovered, using raw index columns: {}", reason)
                }
                DictionaryFallback::Error => {
                    return Err(MaterializeError::DictionaryRecovery(reason.clone()))
                }
            }
        }
        debug!(
            "Recovered schema with {} fields, {} dictionaries",
            recovery.schema.fields().len(),
            recovery.memo.len()
        );
        Ok(recovery)
    }
}
