//! TOML config loading for the evaluation CLI.
//!
//! Deserializes an eval TOML with `[episode]`, `[learner]` and `[backbone]`
//! sections, then merges with CLI overrides. Priority chain: built-in
//! defaults < TOML values < CLI flags.

use std::path::Path;

use backbone::ResNet12Config;
use meta_eval::{EpisodeConfig, RidgeConfig};
use serde::Deserialize;

/// Top-level structure of an eval config TOML.
#[derive(Debug, Default, Deserialize)]
pub struct EvalToml {
    /// Episode geometry overrides.
    #[serde(default)]
    pub episode: EpisodeOverrides,
    /// Ridge learner overrides.
    #[serde(default)]
    pub learner: LearnerOverrides,
    /// Backbone architecture overrides.
    #[serde(default)]
    pub backbone: BackboneOverrides,
}

/// Optional overrides for [`EpisodeConfig`] fields.
#[derive(Debug, Default, Deserialize)]
pub struct EpisodeOverrides {
    /// Classes per episode.
    pub n_ways: Option<usize>,
    /// Support samples per class.
    pub k_shots: Option<usize>,
    /// Query samples per class.
    pub q_queries: Option<usize>,
    /// Base sampling seed.
    pub seed: Option<u64>,
    /// Episodes per partition.
    pub episodes: Option<usize>,
    /// L2-normalize feature rows before fitting.
    pub normalize: Option<bool>,
}

/// Optional overrides for [`RidgeConfig`] fields.
#[derive(Debug, Default, Deserialize)]
pub struct LearnerOverrides {
    pub init_scale: Option<f64>,
    pub init_bias: Option<f64>,
    pub init_lambda: Option<f64>,
    pub adapt_lr: Option<f64>,
}

/// Optional overrides for the backbone architecture.
///
/// These must match the checkpoint being loaded; the record format stores
/// weights only, not the architecture.
#[derive(Debug, Default, Deserialize)]
pub struct BackboneOverrides {
    /// Classes in the linear head (base-training classes).
    pub num_classes: Option<usize>,
    pub c1: Option<usize>,
    pub c2: Option<usize>,
    pub c3: Option<usize>,
    pub c4: Option<usize>,
    /// Input image channels.
    pub in_channels: Option<usize>,
}

/// Load and deserialize an [`EvalToml`] from a TOML file.
pub fn load_eval_toml(path: &Path) -> anyhow::Result<EvalToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
    let config: EvalToml = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded eval config");
    Ok(config)
}

/// CLI overrides for episode geometry, applied on top of the TOML.
#[derive(Debug, Default, Clone)]
pub struct EpisodeCliOverrides {
    pub n_ways: Option<usize>,
    pub k_shots: Option<usize>,
    pub q_queries: Option<usize>,
    pub seed: Option<u64>,
}

/// Build an [`EpisodeConfig`] from defaults, TOML overrides, and CLI flags.
pub fn build_episode_config(toml: &EpisodeOverrides, cli: &EpisodeCliOverrides) -> EpisodeConfig {
    let mut config = EpisodeConfig::default();

    if let Some(n) = toml.n_ways {
        config.n_ways = n;
    }
    if let Some(k) = toml.k_shots {
        config.k_shots = k;
    }
    if let Some(q) = toml.q_queries {
        config.q_queries = q;
    }
    if let Some(s) = toml.seed {
        config.seed = s;
    }

    // CLI overrides take highest priority
    if let Some(n) = cli.n_ways {
        config.n_ways = n;
    }
    if let Some(k) = cli.k_shots {
        config.k_shots = k;
    }
    if let Some(q) = cli.q_queries {
        config.q_queries = q;
    }
    if let Some(s) = cli.seed {
        config.seed = s;
    }

    config
}

/// Build a [`RidgeConfig`] from defaults and TOML overrides.
pub fn build_ridge_config(toml: &LearnerOverrides) -> RidgeConfig {
    let mut config = RidgeConfig::default();
    if let Some(v) = toml.init_scale {
        config.init_scale = v;
    }
    if let Some(v) = toml.init_bias {
        config.init_bias = v;
    }
    if let Some(v) = toml.init_lambda {
        config.init_lambda = v;
    }
    if let Some(v) = toml.adapt_lr {
        config.adapt_lr = v;
    }
    config
}

/// Build a [`ResNet12Config`] from defaults, TOML overrides, and the CLI
/// `--num-classes` flag.
pub fn build_backbone_config(
    toml: &BackboneOverrides,
    num_classes_cli: Option<usize>,
) -> ResNet12Config {
    let mut config = ResNet12Config::new(toml.num_classes.unwrap_or(64));
    if let Some(v) = toml.c1 {
        config.c1 = v;
    }
    if let Some(v) = toml.c2 {
        config.c2 = v;
    }
    if let Some(v) = toml.c3 {
        config.c3 = v;
    }
    if let Some(v) = toml.c4 {
        config.c4 = v;
    }
    if let Some(v) = toml.in_channels {
        config.in_channels = v;
    }
    if let Some(n) = num_classes_cli {
        config.num_classes = n;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_eval_toml() {
        let toml_str = r#"
[episode]
n_ways = 5
k_shots = 5
q_queries = 15
seed = 7
episodes = 2000
normalize = false

[learner]
init_scale = 0.5
init_lambda = 10.0
adapt_lr = 0.005

[backbone]
num_classes = 64
c4 = 640
"#;
        let config: EvalToml = toml::from_str(toml_str).unwrap();
        assert_eq!(config.episode.n_ways, Some(5));
        assert_eq!(config.episode.episodes, Some(2000));
        assert_eq!(config.episode.normalize, Some(false));
        assert_eq!(config.learner.init_scale, Some(0.5));
        assert!(config.learner.init_bias.is_none());
        assert_eq!(config.backbone.num_classes, Some(64));
        assert_eq!(config.backbone.c4, Some(640));
    }

    #[test]
    fn test_deserialize_empty_toml() {
        let config: EvalToml = toml::from_str("").unwrap();
        assert!(config.episode.n_ways.is_none());
        assert!(config.learner.adapt_lr.is_none());
        assert!(config.backbone.c1.is_none());
    }

    #[test]
    fn test_cli_override_priority() {
        let toml = EpisodeOverrides {
            n_ways: Some(10),
            k_shots: Some(5),
            q_queries: None,
            seed: Some(1),
            episodes: None,
            normalize: None,
        };
        let cli = EpisodeCliOverrides {
            n_ways: Some(20),
            k_shots: None,
            q_queries: None,
            seed: None,
        };

        let config = build_episode_config(&toml, &cli);
        assert_eq!(config.n_ways, 20); // CLI wins
        assert_eq!(config.k_shots, 5); // TOML wins over default
        assert_eq!(config.q_queries, EpisodeConfig::default().q_queries);
        assert_eq!(config.seed, 1);
    }

    #[test]
    fn test_backbone_defaults() {
        let config = build_backbone_config(&BackboneOverrides::default(), None);
        assert_eq!(config.num_classes, 64);
        assert_eq!(config.c4, 640);
        assert_eq!(config.in_channels, 3);

        let config = build_backbone_config(&BackboneOverrides::default(), Some(100));
        assert_eq!(config.num_classes, 100);
    }

    #[test]
    fn test_load_missing_config_is_error() {
        assert!(load_eval_toml(Path::new("/nonexistent/eval.toml")).is_err());
    }
}
