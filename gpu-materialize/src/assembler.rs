use arrow_array::Array;
use arrow_interop::DictionaryMemo;
use tracing::debug;

use crate::device_reader::DeviceReader;
use crate::frame::{GpuDataFrame, MaterializedColumn};

/// Install every column of `reader` into a fresh frame, in schema order.
/// Columns with recovered dictionary values become dictionary columns.
pub fn assemble(reader: DeviceReader, memo: &DictionaryMemo) -> GpuDataFrame {
    let (device, columns) = reader.into_parts();
    let mut frame = GpuDataFrame::on_device(device);

    for column in columns {
        let column = match memo.get(&column.name) {
            Some(values) => {
                debug!("Column '{}' is dictionary-encoded ({} values)", column.name, values.len());
                MaterializedColumn::Dictionary { indices: column, values: values.clone() }
            }
            None => MaterializedColumn::Plain(column),
        };
        frame.insert(column);
    }

    frame
}
