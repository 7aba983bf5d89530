//! Reload Manager (§4.13): fans a single reload signal out to every
//! subscribed processor and clears the template cache ahead of it, so a
//! SIGHUP-triggered reload always re-reads template sources from disk.

use confd_template::TemplateCache;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// Per-subscriber half of the fan-out: a capacity-1 `watch` channel. A
/// subscriber that's mid-cycle when a reload fires simply observes the
/// new generation on its next poll; reloads never queue.
pub struct ReloadSubscription(watch::Receiver<u64>);

impl ReloadSubscription {
    /// Resolve once a new reload generation is published.
    pub async fn changed(&mut self) {
        let _ = self.0.changed().await;
    }

    pub fn generation(&self) -> u64 {
        *self.0.borrow()
    }
}

pub struct ReloadManager {
    template_cache: Arc<TemplateCache>,
    subscribers: RwLock<Vec<watch::Sender<u64>>>,
}

impl ReloadManager {
    pub fn new(template_cache: Arc<TemplateCache>) -> Self {
        Self {
            template_cache,
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a new subscriber, starting at generation 0.
    pub fn subscribe(&self) -> ReloadSubscription {
        let (tx, rx) = watch::channel(0u64);
        self.subscribers.write().expect("reload manager lock poisoned").push(tx);
        ReloadSubscription(rx)
    }

    /// Clear the template cache and publish a new generation to every
    /// live subscriber. Dead subscribers (receiver dropped) are pruned.
    pub fn trigger_reload(&self) {
        self.template_cache.clear();

        let mut subscribers = self.subscribers.write().expect("reload manager lock poisoned");
        subscribers.retain(|tx| {
            let next = tx.borrow().wrapping_add(1);
            tx.send(next).is_ok()
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("reload manager lock poisoned").len()
    }
}
