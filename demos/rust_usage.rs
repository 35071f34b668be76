use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::types::Int32Type;
use arrow_array::{ArrayRef, DictionaryArray, Float64Array, RecordBatch};
use arrow_ipc::writer::{
    write_message, DictionaryTracker, IpcDataGenerator, IpcWriteOptions, StreamWriter,
};
use gpu_ipc_client::arrow_interop::row_decode::{decode_rows, WireColumn, WireDatum};
use gpu_ipc_client::arrow_interop::temporal;
use gpu_ipc_client::gpu_memory_manager::{HostDeviceIpc, HostSharedMemory};
use gpu_ipc_client::{HandleBundle, MaterializeConfig, Materializer};
use tracing::{info, Level};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    info!("GPU IPC client - Rust examples");

    // Example 1: GPU-delivered result with a dictionary column
    gpu_result_example()?;

    // Example 2: row-wise result decoded on the CPU
    row_result_example()?;

    // Example 3: temporal codecs
    temporal_example()?;

    Ok(())
}

fn gpu_result_example() -> Result<()> {
    info!("=== Example 1: GPU result ===");

    // Stand-ins for the server's shared memory and device allocations.
    let shm = Arc::new(HostSharedMemory::new());
    let ipc = Arc::new(HostDeviceIpc::new());

    let prices: ArrayRef = Arc::new(Float64Array::from(vec![9.5, 12.0, 7.25, 30.0]));
    let regions: DictionaryArray<Int32Type> =
        vec!["north", "south", "north", "east"].into_iter().collect();
    let keys: ArrayRef = Arc::new(regions.keys().clone());
    let result = RecordBatch::try_from_iter(vec![
        ("price", prices.clone()),
        ("region", Arc::new(regions) as ArrayRef),
    ])?;
    let device_batch = RecordBatch::try_from_iter(vec![("price", prices), ("region", keys)])?;

    // Server side: schema + dictionaries into shared memory, data onto the device.
    let mut schema_bytes = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut schema_bytes, result.schema().as_ref())?;
        writer.write(&result)?;
        writer.finish()?;
    }
    let options = IpcWriteOptions::default();
    let (_, encoded) = IpcDataGenerator::default().encoded_batch(
        &device_batch,
        &mut DictionaryTracker::new(false),
        &options,
    )?;
    let mut device_bytes = Vec::new();
    write_message(&mut device_bytes, encoded, &options)?;

    let bundle = HandleBundle::new(
        ipc.export(device_bytes),
        shm.create(schema_bytes.clone()),
        schema_bytes.len(),
    );

    // Client side.
    let materializer = Materializer::new(shm.clone(), ipc, MaterializeConfig::default());
    let frame = materializer
        .materialize(bundle)
        .context("Materializing GPU result")?;

    for column in frame.columns() {
        info!(
            "  {} ({:?}, dictionary: {})",
            column.name(),
            column.device_column().data_type,
            column.is_dictionary()
        );
    }

    let batch = frame.to_record_batch()?;
    info!("Host copy: {} rows x {} columns", batch.num_rows(), batch.num_columns());
    info!("Shared memory after materialization: {:?}", shm.stats());

    Ok(())
}

fn row_result_example() -> Result<()> {
    info!("=== Example 2: Row-wise result ===");

    let columns = vec![
        WireColumn::new("id", "BIGINT"),
        WireColumn::new("created", "TIMESTAMP").with_precision(3),
        WireColumn::new("name", "STR"),
    ];
    let rows = vec![
        vec![WireDatum::int(1), WireDatum::int(1_600_000_000_123), WireDatum::str("alpha")],
        vec![WireDatum::int(2), WireDatum::int(i64::MIN), WireDatum::str("")],
    ];

    let batch = decode_rows(&columns, &rows)?;
    info!("Decoded {} rows; schema: {:?}", batch.num_rows(), batch.schema());

    Ok(())
}

fn temporal_example() -> Result<()> {
    info!("=== Example 3: Temporal codecs ===");

    for precision in [0, 3, 6, 9] {
        let value = temporal::decode_epoch(1_600_000_000_123_456_789 / 10i64.pow(9 - precision as u32), precision)?;
        info!("  precision {}: {}", precision, value);
    }
    info!("  45296 seconds after midnight is {}", temporal::seconds_to_time(45_296));

    Ok(())
}
