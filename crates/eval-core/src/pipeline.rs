//! Evaluation pipelines behind the CLI subcommands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::bail;
use burn::backend::ndarray::NdArray;
use indicatif::ProgressBar;

use backbone::{FeatureExtractor, FeatureSource};
use dataset::{FeatureCacheReader, FeatureCacheWriter, FeatureRecord, PartitionReader};
use meta_eval::{meta_test, EpisodeSampler, EvalOptions, Learner};

use crate::config::{
    build_backbone_config, build_episode_config, build_ridge_config, load_eval_toml,
    EpisodeCliOverrides, EvalToml,
};
use crate::results::EvalResult;

type Backend = NdArray<f32>;

pub struct EvalArgs {
    pub checkpoint: PathBuf,
    pub data_dir: PathBuf,
    pub config: Option<PathBuf>,
    pub partitions: Vec<String>,
    pub episodes: Option<usize>,
    pub n_ways: Option<usize>,
    pub k_shots: Option<usize>,
    pub q_queries: Option<usize>,
    pub seed: Option<u64>,
    pub classifier: String,
    pub feature_source: String,
    pub adapt_lr: Option<f64>,
    pub batch_size: usize,
    pub num_workers: usize,
    pub num_classes: Option<usize>,
    pub features_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

pub struct ExtractFeaturesArgs {
    pub checkpoint: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub config: Option<PathBuf>,
    pub batch_size: usize,
    pub num_classes: Option<usize>,
}

pub struct SummaryArgs {
    pub input: PathBuf,
    pub json: bool,
}

/// Run episodic evaluation over one or more dataset partitions.
///
/// The learner persists across partitions: with the ridge classifier,
/// episodes on "val" each take one calibration step, and later partitions
/// are scored with the calibrated values frozen.
pub fn run_eval(args: EvalArgs) -> anyhow::Result<()> {
    let start = Instant::now();
    let toml = match &args.config {
        Some(path) => load_eval_toml(path)?,
        None => EvalToml::default(),
    };

    let cli = EpisodeCliOverrides {
        n_ways: args.n_ways,
        k_shots: args.k_shots,
        q_queries: args.q_queries,
        seed: args.seed,
    };
    let episode_config = build_episode_config(&toml.episode, &cli);
    let episodes = args.episodes.or(toml.episode.episodes).unwrap_or(1000);
    let normalize = toml.episode.normalize.unwrap_or(true);
    let source = FeatureSource::parse(&args.feature_source)?;

    let device = Default::default();
    let model =
        build_backbone_config(&toml.backbone, args.num_classes).load::<Backend>(&args.checkpoint, &device)?;
    let extractor = FeatureExtractor::new(model, device, args.batch_size);

    let mut ridge_config = build_ridge_config(&toml.learner);
    if let Some(lr) = args.adapt_lr {
        ridge_config.adapt_lr = lr;
    }
    let mut learner = match args.classifier.as_str() {
        "r2d2" => Learner::ridge(&ridge_config),
        "centroid" => Learner::centroid(),
        other => bail!("Unknown classifier '{other}' (expected 'r2d2' or 'centroid')"),
    };

    let mut results = Vec::new();
    for partition in &args.partitions {
        let (features, class_ids) = load_features(&args, &extractor, partition, source)?;
        tracing::info!(
            partition = %partition,
            samples = features.len(),
            dim = features.first().map_or(0, |r| r.len()),
            "Loaded features"
        );

        let sampler = Arc::new(EpisodeSampler::new(
            episode_config.clone(),
            features,
            &class_ids,
        )?);

        let adapt = matches!(learner, Learner::Ridge(_)) && partition == "val";
        let options = EvalOptions {
            episodes,
            normalize,
            adapt,
            num_workers: args.num_workers,
            progress: true,
        };

        let summary = meta_test(sampler, &mut learner, &options);
        println!(
            "{partition}_acc: {:.4}, std: {:.4}, ci95: {:.4}, time: {:.1}s",
            summary.mean_accuracy, summary.std, summary.ci95, summary.elapsed_secs
        );

        results.push(EvalResult::from_summary(
            &summary,
            args.checkpoint.display().to_string(),
            partition.clone(),
            episode_config.n_ways,
            episode_config.k_shots,
            episode_config.q_queries,
            episode_config.seed,
            args.classifier.clone(),
            args.feature_source.clone(),
        ));
    }

    if let Some(output) = &args.output {
        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(output, json)?;
        println!("Results: {}", output.display());
    }
    println!("Total elapsed: {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

/// Feature rows and class labels for a partition, from the cache when one
/// exists, otherwise by running the backbone over the partition images.
fn load_features(
    args: &EvalArgs,
    extractor: &FeatureExtractor<Backend>,
    partition: &str,
    source: FeatureSource,
) -> anyhow::Result<(Vec<Vec<f32>>, Vec<u32>)> {
    if let Some(dir) = &args.features_dir {
        let cache_path = dir.join(format!("{partition}_features.parquet"));
        if cache_path.is_file() {
            let records = FeatureCacheReader::read_all(&cache_path)?;
            let class_ids: Vec<u32> = records.iter().map(|r| r.class_id).collect();
            let rows: Vec<Vec<f32>> = records
                .into_iter()
                .map(|r| match source {
                    FeatureSource::Embeddings => r.embedding,
                    FeatureSource::Logits => r.logits,
                })
                .collect();
            return Ok((rows, class_ids));
        }
        tracing::warn!(
            path = %cache_path.display(),
            "No feature cache for partition, extracting from images"
        );
    }

    let partition_path = args.data_dir.join(format!("{partition}.parquet"));
    let records = PartitionReader::read_all(&partition_path)?;
    if records.is_empty() {
        bail!("Partition {} is empty", partition_path.display());
    }
    let shape = records[0].shape();
    if records.iter().any(|r| r.shape() != shape) {
        bail!("Partition {} has mixed image shapes", partition_path.display());
    }

    let class_ids: Vec<u32> = records.iter().map(|r| r.class_id).collect();
    let images: Vec<Vec<f32>> = records.into_iter().map(|r| r.image).collect();
    let rows = extractor.extract(&images, shape, source)?;
    Ok((rows, class_ids))
}

/// Precompute backbone outputs for a partition and write a feature cache.
pub fn run_extract_features(args: ExtractFeaturesArgs) -> anyhow::Result<()> {
    let toml = match &args.config {
        Some(path) => load_eval_toml(path)?,
        None => EvalToml::default(),
    };

    let device = Default::default();
    let model =
        build_backbone_config(&toml.backbone, args.num_classes).load::<Backend>(&args.checkpoint, &device)?;
    let extractor = FeatureExtractor::new(model, device, args.batch_size);

    let records = PartitionReader::read_all(&args.input)?;
    if records.is_empty() {
        bail!("Partition {} is empty", args.input.display());
    }
    let shape = records[0].shape();
    if records.iter().any(|r| r.shape() != shape) {
        bail!("Partition {} has mixed image shapes", args.input.display());
    }

    let bar = ProgressBar::new(records.len() as u64);
    let mut writer = FeatureCacheWriter::new(args.output.clone());
    for chunk in records.chunks(args.batch_size) {
        let images: Vec<Vec<f32>> = chunk.iter().map(|r| r.image.clone()).collect();
        let (embeddings, logits) = extractor.extract_pair(&images, shape)?;
        for ((record, embedding), logits) in chunk.iter().zip(embeddings).zip(logits) {
            writer.record(FeatureRecord {
                sample_id: record.sample_id,
                class_id: record.class_id,
                embedding,
                logits,
            });
        }
        bar.inc(images.len() as u64);
    }
    bar.finish_and_clear();

    let count = writer.len();
    let path = writer.finish()?;
    println!("Extracted features for {count} samples");
    println!("Output: {}", path.display());

    Ok(())
}

/// Print statistics for a partition Parquet file.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let summary = PartitionReader::read_summary(&args.input)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("--- Partition Summary ---");
    println!("File: {}", args.input.display());
    println!("Total samples: {}", summary.total_samples);
    println!("Classes: {}", summary.num_classes);
    let (c, h, w) = summary.image_shape;
    println!("Image shape: {c}x{h}x{w}");
    if let (Some(min), Some(max)) = (
        summary.class_counts.values().min(),
        summary.class_counts.values().max(),
    ) {
        println!("Samples per class: {min}..{max}");
    }

    Ok(())
}
