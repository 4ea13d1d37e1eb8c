//! Background episode materialization.
//!
//! Scoring is strictly sequential, but episode assembly (row gathering and
//! cloning) is independent per episode, so a small worker pool builds
//! episodes ahead of the consumer. Episodes are seeded by their index, so
//! worker scheduling cannot change the evaluation result; a reorder buffer
//! on the consumer side restores index order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::episode::Episode;
use crate::sampler::EpisodeSampler;

/// Bounded queue depth per worker.
const CHANNEL_DEPTH: usize = 4;

/// Streams `total` episodes in index order, built by background workers.
pub struct Prefetcher {
    rx: Option<Receiver<(usize, Episode)>>,
    reorder: BTreeMap<usize, Episode>,
    next: usize,
    total: usize,
    workers: Vec<JoinHandle<()>>,
}

impl Prefetcher {
    pub fn new(sampler: Arc<EpisodeSampler>, total: usize, num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = sync_channel(num_workers * CHANNEL_DEPTH);

        let workers = (0..num_workers)
            .map(|_| {
                let sampler = Arc::clone(&sampler);
                let counter = Arc::clone(&counter);
                let tx = tx.clone();
                std::thread::spawn(move || loop {
                    let idx = counter.fetch_add(1, Ordering::Relaxed);
                    if idx >= total {
                        return;
                    }
                    let episode = sampler.sample_at(idx);
                    // The receiver hanging up means the consumer is done.
                    if tx.send((idx, episode)).is_err() {
                        return;
                    }
                })
            })
            .collect();

        Self {
            rx: Some(rx),
            reorder: BTreeMap::new(),
            next: 0,
            total,
            workers,
        }
    }
}

impl Iterator for Prefetcher {
    type Item = Episode;

    fn next(&mut self) -> Option<Episode> {
        if self.next >= self.total {
            return None;
        }
        let rx = self.rx.as_ref()?;
        loop {
            if let Some(episode) = self.reorder.remove(&self.next) {
                self.next += 1;
                return Some(episode);
            }
            match rx.recv() {
                Ok((idx, episode)) => {
                    self.reorder.insert(idx, episode);
                }
                Err(_) => return None,
            }
        }
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        // Closing the channel unblocks workers stuck on a full queue.
        drop(self.rx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::EpisodeConfig;

    fn make_sampler(seed: u64) -> Arc<EpisodeSampler> {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for c in 0..6u32 {
            for s in 0..5 {
                features.push(vec![c as f32, s as f32]);
                labels.push(c);
            }
        }
        let config = EpisodeConfig {
            n_ways: 3,
            k_shots: 1,
            q_queries: 2,
            seed,
        };
        Arc::new(EpisodeSampler::new(config, features, &labels).unwrap())
    }

    #[test]
    fn test_yields_all_episodes_in_order() {
        let prefetcher = Prefetcher::new(make_sampler(0), 20, 3);
        let indices: Vec<usize> = prefetcher.map(|e| e.index).collect();
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_matches_sequential_sampling() {
        let sampler = make_sampler(9);
        let prefetched: Vec<Episode> = Prefetcher::new(Arc::clone(&sampler), 10, 4).collect();

        for (idx, episode) in prefetched.iter().enumerate() {
            let direct = sampler.sample_at(idx);
            assert_eq!(episode.support, direct.support);
            assert_eq!(episode.query, direct.query);
            assert_eq!(episode.query_labels, direct.query_labels);
        }
    }

    #[test]
    fn test_early_drop_does_not_hang() {
        let mut prefetcher = Prefetcher::new(make_sampler(3), 100, 2);
        let first = prefetcher.next();
        assert!(first.is_some());
        drop(prefetcher);
    }

    #[test]
    fn test_zero_episodes() {
        let mut prefetcher = Prefetcher::new(make_sampler(0), 0, 2);
        assert!(prefetcher.next().is_none());
    }
}
