/// Caching, read-only wrapper around a [`FeatureView`]
///
/// Each URN gets a cache slot that is filled at most once, so concurrent
/// reads of one URN share a single fetch and every later read returns the
/// same `Arc`. When a fill would take the cache past `max_size` entries the
/// whole cache is flushed first.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::feature_view::{FeatureView, GetOptions};
use crate::reference::{IntoReference, Reference};
use crate::types::FeatureRecord;
use crate::Result;

type Slot = Arc<OnceCell<Option<Arc<FeatureRecord>>>>;

pub struct ReadonlyFeatureView {
    view: FeatureView,
    max_size: usize,
    cache: Mutex<HashMap<String, Slot>>,
}

impl ReadonlyFeatureView {
    pub fn new(view: FeatureView, max_size: usize) -> Self {
        Self {
            view,
            max_size,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn view(&self) -> &FeatureView {
        &self.view
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    fn cache_key(reference: &Reference) -> String {
        reference.urn(false)
    }

    /// Make room for `incoming` new keys, flushing everything if they would not fit
    fn make_room(cache: &mut HashMap<String, Slot>, incoming: usize, max_size: usize) {
        if incoming > 0 && cache.len() + incoming > max_size {
            debug!("Read-only cache full ({} entries), flushing", cache.len());
            cache.clear();
        }
    }

    /// Cached lookup. A definitive "not found" is cached as well.
    pub async fn get<R: IntoReference + ?Sized>(&self, r: &R, options: GetOptions) -> Result<Option<Arc<FeatureRecord>>> {
        let Some(reference) = r.to_reference(&self.view.database().config().default_datasource, options.error_if_bad)?
        else {
            return Ok(None);
        };
        let key = Self::cache_key(&reference);

        let slot = {
            let mut cache = self.cache.lock();
            match cache.get(&key) {
                Some(slot) => slot.clone(),
                None => {
                    Self::make_room(&mut cache, 1, self.max_size);
                    let slot: Slot = Arc::new(OnceCell::new());
                    cache.insert(key, slot.clone());
                    slot
                }
            }
        };

        let rec = slot
            .get_or_try_init(|| async {
                Ok::<_, crate::Error>(self.view.get(&reference, options).await?.map(Arc::new))
            })
            .await?;
        Ok(rec.clone())
    }

    /// Cached batch lookup; only records that were found are cached
    pub async fn get_recs<R: IntoReference>(&self, refs: &[R], options: GetOptions) -> Result<Vec<Arc<FeatureRecord>>> {
        let default_datasource = &self.view.database().config().default_datasource;
        let mut keys = Vec::new();
        let mut misses = Vec::new();
        let mut found: HashMap<String, Arc<FeatureRecord>> = HashMap::new();

        {
            let cache = self.cache.lock();
            for r in refs {
                let Some(reference) = r.to_reference(default_datasource, options.error_if_bad)? else {
                    continue;
                };
                let key = Self::cache_key(&reference);
                match cache.get(&key).and_then(|slot| slot.get()) {
                    Some(Some(rec)) => {
                        found.insert(key.clone(), rec.clone());
                    }
                    Some(None) => {}
                    None => misses.push(reference),
                }
                keys.push(key);
            }
        }

        if !misses.is_empty() {
            let fetched = self.view.get_recs(&misses[..], options).await?;

            let mut cache = self.cache.lock();
            let fetched: Vec<(String, Arc<FeatureRecord>)> = fetched
                .into_iter()
                .map(|rec| (Self::cache_key(&rec.reference()), Arc::new(rec)))
                .collect();
            let incoming = fetched.iter().filter(|(key, _)| !cache.contains_key(key)).count();
            Self::make_room(&mut cache, incoming, self.max_size);

            // A batch larger than the cache is returned in full but cached only up to max_size
            for (key, rec) in fetched {
                if cache.contains_key(&key) || cache.len() < self.max_size {
                    cache.insert(key.clone(), Arc::new(OnceCell::new_with(Some(Some(rec.clone())))));
                }
                found.insert(key, rec);
            }
        }

        let mut recs = Vec::new();
        for key in keys {
            if let Some(rec) = found.remove(&key) {
                recs.push(rec);
            }
        }
        Ok(recs)
    }
}
