//! Reads partition samples and feature records from Parquet files.

use std::collections::BTreeMap;
use std::path::Path;

use arrow::array::*;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::types::{FeatureRecord, PartitionSummary, SampleRecord};

/// Static methods for reading partition data from Parquet files.
pub struct PartitionReader;

impl PartitionReader {
    /// Read all samples from a partition Parquet file.
    pub fn read_all(path: &Path) -> anyhow::Result<Vec<SampleRecord>> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open partition {}: {e}", path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut records = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;
            let mut batch_records = extract_samples_from_batch(&batch)?;
            records.append(&mut batch_records);
        }

        tracing::debug!(
            count = records.len(),
            path = %path.display(),
            "Read partition samples"
        );

        Ok(records)
    }

    /// Compute summary statistics for a partition Parquet file.
    pub fn read_summary(path: &Path) -> anyhow::Result<PartitionSummary> {
        let records = Self::read_all(path)?;

        let mut class_counts: BTreeMap<u32, usize> = BTreeMap::new();
        for record in &records {
            *class_counts.entry(record.class_id).or_insert(0) += 1;
        }

        let image_shape = records.first().map(|r| r.shape()).unwrap_or((0, 0, 0));

        Ok(PartitionSummary {
            total_samples: records.len(),
            num_classes: class_counts.len(),
            class_counts,
            image_shape,
        })
    }
}

/// Static methods for reading feature caches from Parquet files.
pub struct FeatureCacheReader;

impl FeatureCacheReader {
    /// Read all feature records from a feature cache Parquet file.
    pub fn read_all(path: &Path) -> anyhow::Result<Vec<FeatureRecord>> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open feature cache {}: {e}", path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut records = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;
            let mut batch_records = extract_features_from_batch(&batch)?;
            records.append(&mut batch_records);
        }

        tracing::debug!(
            count = records.len(),
            path = %path.display(),
            "Read feature records"
        );

        Ok(records)
    }
}

/// Downcast a list column and pull out row `i` as a `Vec<f32>`.
fn list_row(list: &ListArray, i: usize, column: &str) -> anyhow::Result<Vec<f32>> {
    let values = list.value(i);
    let floats = values
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| anyhow::anyhow!("Column {column} items are not Float32"))?;
    Ok(floats.values().to_vec())
}

fn extract_samples_from_batch(batch: &RecordBatch) -> anyhow::Result<Vec<SampleRecord>> {
    let sample_ids = batch
        .column(0)
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| anyhow::anyhow!("Column 0 (sample_id) is not UInt64Array"))?;

    let class_names = batch
        .column(1)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow::anyhow!("Column 1 (class_name) is not StringArray"))?;

    let class_ids = batch
        .column(2)
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| anyhow::anyhow!("Column 2 (class_id) is not UInt32Array"))?;

    let channels = batch
        .column(3)
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| anyhow::anyhow!("Column 3 (channels) is not UInt32Array"))?;

    let heights = batch
        .column(4)
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| anyhow::anyhow!("Column 4 (height) is not UInt32Array"))?;

    let widths = batch
        .column(5)
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| anyhow::anyhow!("Column 5 (width) is not UInt32Array"))?;

    let images = batch
        .column(6)
        .as_any()
        .downcast_ref::<ListArray>()
        .ok_or_else(|| anyhow::anyhow!("Column 6 (image) is not ListArray"))?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let image = list_row(images, i, "image")?;
        let expected = (channels.value(i) * heights.value(i) * widths.value(i)) as usize;
        if image.len() != expected {
            anyhow::bail!(
                "Sample {} image has {} values, expected {} (CHW {}x{}x{})",
                sample_ids.value(i),
                image.len(),
                expected,
                channels.value(i),
                heights.value(i),
                widths.value(i),
            );
        }

        records.push(SampleRecord {
            sample_id: sample_ids.value(i),
            class_name: class_names.value(i).to_string(),
            class_id: class_ids.value(i),
            channels: channels.value(i),
            height: heights.value(i),
            width: widths.value(i),
            image,
        });
    }

    Ok(records)
}

fn extract_features_from_batch(batch: &RecordBatch) -> anyhow::Result<Vec<FeatureRecord>> {
    let sample_ids = batch
        .column(0)
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| anyhow::anyhow!("Column 0 (sample_id) is not UInt64Array"))?;

    let class_ids = batch
        .column(1)
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| anyhow::anyhow!("Column 1 (class_id) is not UInt32Array"))?;

    let embeddings = batch
        .column(2)
        .as_any()
        .downcast_ref::<ListArray>()
        .ok_or_else(|| anyhow::anyhow!("Column 2 (embedding) is not ListArray"))?;

    let logits = batch
        .column(3)
        .as_any()
        .downcast_ref::<ListArray>()
        .ok_or_else(|| anyhow::anyhow!("Column 3 (logits) is not ListArray"))?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        records.push(FeatureRecord {
            sample_id: sample_ids.value(i),
            class_id: class_ids.value(i),
            embedding: list_row(embeddings, i, "embedding")?,
            logits: list_row(logits, i, "logits")?,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{FeatureCacheWriter, PartitionWriter};
    use tempfile::TempDir;

    fn make_sample(sample_id: u64, class_id: u32) -> SampleRecord {
        SampleRecord {
            sample_id,
            class_name: format!("class_{class_id}"),
            class_id,
            channels: 3,
            height: 2,
            width: 2,
            image: (0..12).map(|v| v as f32 * 0.1 + sample_id as f32).collect(),
        }
    }

    #[test]
    fn test_partition_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("roundtrip.parquet");

        let mut writer = PartitionWriter::new(path.clone());
        for i in 0..20 {
            writer.record(make_sample(i, (i % 4) as u32));
        }
        writer.finish().unwrap();

        let records = PartitionReader::read_all(&path).unwrap();
        assert_eq!(records.len(), 20);

        assert_eq!(records[0].sample_id, 0);
        assert_eq!(records[0].class_id, 0);
        assert_eq!(records[0].shape(), (3, 2, 2));
        assert_eq!(records[0].image.len(), 12);
        assert!((records[0].image[1] - 0.1).abs() < 1e-6);

        assert_eq!(records[19].sample_id, 19);
        assert_eq!(records[19].class_name, "class_3");
        assert!((records[19].image[0] - 19.0).abs() < 1e-6);
    }

    #[test]
    fn test_partition_summary() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("summary.parquet");

        let mut writer = PartitionWriter::new(path.clone());
        // 3 classes with 5, 3, 2 samples
        for i in 0..5 {
            writer.record(make_sample(i, 0));
        }
        for i in 5..8 {
            writer.record(make_sample(i, 1));
        }
        for i in 8..10 {
            writer.record(make_sample(i, 2));
        }
        writer.finish().unwrap();

        let summary = PartitionReader::read_summary(&path).unwrap();
        assert_eq!(summary.total_samples, 10);
        assert_eq!(summary.num_classes, 3);
        assert_eq!(summary.class_counts[&0], 5);
        assert_eq!(summary.class_counts[&1], 3);
        assert_eq!(summary.class_counts[&2], 2);
        assert_eq!(summary.image_shape, (3, 2, 2));
    }

    #[test]
    fn test_feature_cache_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("features.parquet");

        let mut writer = FeatureCacheWriter::new(path.clone());
        for i in 0..8 {
            writer.record(FeatureRecord {
                sample_id: i,
                class_id: (i % 2) as u32,
                embedding: vec![i as f32 + 0.5; 16],
                logits: vec![-(i as f32); 4],
            });
        }
        writer.finish().unwrap();

        let records = FeatureCacheReader::read_all(&path).unwrap();
        assert_eq!(records.len(), 8);
        assert_eq!(records[3].sample_id, 3);
        assert_eq!(records[3].embedding.len(), 16);
        assert!((records[3].embedding[0] - 3.5).abs() < 1e-6);
        assert_eq!(records[3].logits.len(), 4);
        assert!((records[3].logits[0] + 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = PartitionReader::read_all(Path::new("/nonexistent/nope.parquet"));
        assert!(err.is_err());
    }

    #[test]
    fn test_empty_partition_reads_back_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.parquet");
        PartitionWriter::new(path.clone()).finish().unwrap();

        let records = PartitionReader::read_all(&path).unwrap();
        assert!(records.is_empty());

        let summary = PartitionReader::read_summary(&path).unwrap();
        assert_eq!(summary.total_samples, 0);
        assert_eq!(summary.image_shape, (0, 0, 0));
    }
}
