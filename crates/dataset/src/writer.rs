//! Writes partition samples and feature records to Parquet files using Arrow.

use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use crate::types::{FeatureRecord, SampleRecord};

/// Arrow schema for partition Parquet files (7 columns).
pub fn partition_schema() -> Schema {
    Schema::new(vec![
        Field::new("sample_id", DataType::UInt64, false),
        Field::new("class_name", DataType::Utf8, false),
        Field::new("class_id", DataType::UInt32, false),
        Field::new("channels", DataType::UInt32, false),
        Field::new("height", DataType::UInt32, false),
        Field::new("width", DataType::UInt32, false),
        Field::new_list("image", Field::new("item", DataType::Float32, true), false),
    ])
}

/// Arrow schema for feature cache Parquet files (4 columns).
pub fn feature_schema() -> Schema {
    Schema::new(vec![
        Field::new("sample_id", DataType::UInt64, false),
        Field::new("class_id", DataType::UInt32, false),
        Field::new_list(
            "embedding",
            Field::new("item", DataType::Float32, true),
            false,
        ),
        Field::new_list("logits", Field::new("item", DataType::Float32, true), false),
    ])
}

/// Build a ListArray of f32 vectors.
fn build_f32_list<'a>(rows: impl Iterator<Item = &'a [f32]>) -> ListArray {
    let mut builder = ListBuilder::new(Float32Builder::new());
    for row in rows {
        builder.values().append_slice(row);
        builder.append(true);
    }
    builder.finish()
}

/// Buffers partition samples and writes them to a Parquet file.
pub struct PartitionWriter {
    records: Vec<SampleRecord>,
    output_path: PathBuf,
}

impl PartitionWriter {
    /// Create a new writer that will write to the given path.
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            records: Vec::new(),
            output_path,
        }
    }

    /// Buffer a single sample.
    pub fn record(&mut self, record: SampleRecord) {
        self.records.push(record);
    }

    /// Buffer multiple samples.
    pub fn record_all(&mut self, records: Vec<SampleRecord>) {
        self.records.extend(records);
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write all buffered samples to the Parquet file and return the path.
    pub fn finish(self) -> anyhow::Result<PathBuf> {
        let schema = Arc::new(partition_schema());

        let batch = if self.records.is_empty() {
            RecordBatch::new_empty(schema.clone())
        } else {
            build_partition_batch(&self.records)?
        };

        let file = std::fs::File::create(&self.output_path)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;

        tracing::info!(
            samples = self.records.len(),
            path = %self.output_path.display(),
            "Wrote partition Parquet file"
        );

        Ok(self.output_path)
    }
}

fn build_partition_batch(records: &[SampleRecord]) -> anyhow::Result<RecordBatch> {
    let schema = Arc::new(partition_schema());

    let sample_ids: UInt64Array = records.iter().map(|r| Some(r.sample_id)).collect();
    let class_names: StringArray = records.iter().map(|r| Some(r.class_name.as_str())).collect();
    let class_ids: UInt32Array = records.iter().map(|r| Some(r.class_id)).collect();
    let channels: UInt32Array = records.iter().map(|r| Some(r.channels)).collect();
    let heights: UInt32Array = records.iter().map(|r| Some(r.height)).collect();
    let widths: UInt32Array = records.iter().map(|r| Some(r.width)).collect();
    let images = build_f32_list(records.iter().map(|r| r.image.as_slice()));

    let columns: Vec<Arc<dyn arrow::array::Array>> = vec![
        Arc::new(sample_ids),
        Arc::new(class_names),
        Arc::new(class_ids),
        Arc::new(channels),
        Arc::new(heights),
        Arc::new(widths),
        Arc::new(images),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Buffers feature records and writes them to a Parquet file.
pub struct FeatureCacheWriter {
    records: Vec<FeatureRecord>,
    output_path: PathBuf,
}

impl FeatureCacheWriter {
    /// Create a new writer that will write to the given path.
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            records: Vec::new(),
            output_path,
        }
    }

    /// Buffer a single feature record.
    pub fn record(&mut self, record: FeatureRecord) {
        self.records.push(record);
    }

    /// Buffer multiple feature records.
    pub fn record_all(&mut self, records: Vec<FeatureRecord>) {
        self.records.extend(records);
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write all buffered records to the Parquet file and return the path.
    pub fn finish(self) -> anyhow::Result<PathBuf> {
        let schema = Arc::new(feature_schema());

        let batch = if self.records.is_empty() {
            RecordBatch::new_empty(schema.clone())
        } else {
            build_feature_batch(&self.records)?
        };

        let file = std::fs::File::create(&self.output_path)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;

        tracing::info!(
            records = self.records.len(),
            path = %self.output_path.display(),
            "Wrote feature cache Parquet file"
        );

        Ok(self.output_path)
    }
}

fn build_feature_batch(records: &[FeatureRecord]) -> anyhow::Result<RecordBatch> {
    let schema = Arc::new(feature_schema());

    let sample_ids: UInt64Array = records.iter().map(|r| Some(r.sample_id)).collect();
    let class_ids: UInt32Array = records.iter().map(|r| Some(r.class_id)).collect();
    let embeddings = build_f32_list(records.iter().map(|r| r.embedding.as_slice()));
    let logits = build_f32_list(records.iter().map(|r| r.logits.as_slice()));

    let columns: Vec<Arc<dyn arrow::array::Array>> = vec![
        Arc::new(sample_ids),
        Arc::new(class_ids),
        Arc::new(embeddings),
        Arc::new(logits),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}
