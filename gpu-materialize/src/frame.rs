//! Device-resident result frame.

use arrow_array::{ArrayRef, RecordBatch};
use arrow_interop::{
    columns_to_record_batch, device_column_to_array, dictionary_column, DeviceColumn, InteropError,
};
use gpu_memory_manager::DeviceArray;

use crate::device_reader::DeviceBytes;
use crate::error::{MaterializeError, Result};
use crate::handle::HandleBundle;

/// One installed column.
#[derive(Debug, Clone)]
pub enum MaterializedColumn {
    Plain(DeviceColumn),
    /// Index column plus the distinct values the indices point into.
    Dictionary { indices: DeviceColumn, values: ArrayRef },
}

impl MaterializedColumn {
    pub fn name(&self) -> &str {
        &self.device_column().name
    }

    pub fn len(&self) -> usize {
        self.device_column().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self, Self::Dictionary { .. })
    }

    /// The device view backing this column (the indices, for dictionaries).
    pub fn device_column(&self) -> &DeviceColumn {
        match self {
            Self::Plain(column) => column,
            Self::Dictionary { indices, .. } => indices,
        }
    }

    pub fn dictionary_values(&self) -> Option<&ArrayRef> {
        match self {
            Self::Plain(_) => None,
            Self::Dictionary { values, .. } => Some(values),
        }
    }
}

/// Named columns over a mapped device buffer, plus the handle bundle they
/// came from.
///
/// The provenance is what a consumer uses to release the device allocation
/// once the frame is discarded; the frame never frees device memory itself.
#[derive(Debug, Default)]
pub struct GpuDataFrame {
    columns: Vec<MaterializedColumn>,
    device: Option<DeviceArray>,
    provenance: Option<HandleBundle>,
}

impl GpuDataFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_device(device: DeviceArray) -> Self {
        Self { device: Some(device), ..Self::default() }
    }

    /// Install a column. A column of the same name is replaced in place.
    pub fn insert(&mut self, column: MaterializedColumn) {
        match self.columns.iter_mut().find(|c| c.name() == column.name()) {
            Some(slot) => *slot = column,
            None => self.columns.push(column),
        }
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, MaterializedColumn::len)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(MaterializedColumn::name).collect()
    }

    pub fn columns(&self) -> &[MaterializedColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&MaterializedColumn> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn device(&self) -> Option<&DeviceArray> {
        self.device.as_ref()
    }

    pub fn set_provenance(&mut self, bundle: HandleBundle) {
        self.provenance = Some(bundle);
    }

    pub fn provenance(&self) -> Option<&HandleBundle> {
        self.provenance.as_ref()
    }

    /// Hand the bundle over for release; the frame keeps its columns.
    pub fn take_provenance(&mut self) -> Option<HandleBundle> {
        self.provenance.take()
    }

    /// Copy one column to the host. Dictionary columns come back as
    /// dictionary arrays.
    pub fn column_to_array(&self, name: &str) -> Result<ArrayRef> {
        let column = self
            .column(name)
            .ok_or_else(|| MaterializeError::ColumnNotFound(name.to_string()))?;
        self.copy_column(column)
    }

    /// Copy every column to the host as one record batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let columns = self
            .columns
            .iter()
            .map(|c| Ok((c.name().to_string(), self.copy_column(c)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(columns_to_record_batch(columns)?)
    }

    fn copy_column(&self, column: &MaterializedColumn) -> Result<ArrayRef> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| InteropError::Layout("frame is not bound to a device buffer".into()))?;
        let array = device_column_to_array(column.device_column(), &DeviceBytes(device))?;
        match column.dictionary_values() {
            Some(values) => Ok(dictionary_column(&array, values.clone())?),
            None => Ok(array),
        }
    }
}
