//! Schema-object target resolution.
//!
//! Records may target schema objects instead of explicit spans; what spans
//! those objects currently cover is the metadata collaborator's business,
//! not this subsystem's. [`MetadataResolver`] is that seam: a pure mapping
//! from object id to current spans, with `None` meaning the object has
//! been dropped.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use granite_core::{Error, Result, Span};

use crate::record::{ProtectionTarget, SchemaObjectId};

/// Resolves schema-object identifiers to their current key spans.
#[async_trait]
pub trait MetadataResolver: Send + Sync + 'static {
    /// Returns the object's current spans, or `None` if it was dropped.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unavailable` if metadata is transiently
    /// unreachable; callers log and retry on their next cycle.
    async fn resolve(&self, id: SchemaObjectId) -> Result<Option<Vec<Span>>>;
}

/// Resolves a protection target to the spans it currently covers.
///
/// Explicit span targets resolve to themselves. Schema-object targets
/// resolve each object through `resolver`; dropped objects contribute
/// nothing.
///
/// # Errors
///
/// Propagates resolver failures.
pub async fn resolve_target<R: MetadataResolver + ?Sized>(
    resolver: &R,
    target: &ProtectionTarget,
) -> Result<Vec<Span>> {
    match target {
        ProtectionTarget::Spans(spans) => Ok(spans.clone()),
        ProtectionTarget::SchemaObjects(ids) => {
            let mut spans = Vec::new();
            for id in ids {
                if let Some(mut resolved) = resolver.resolve(*id).await? {
                    spans.append(&mut resolved);
                }
            }
            Ok(spans)
        }
    }
}

/// In-memory resolver over a mutable object→spans map, for tests and
/// demos. Dropping an object removes its entry.
#[derive(Debug, Default)]
pub struct StaticResolver {
    objects: RwLock<HashMap<SchemaObjectId, Vec<Span>>>,
}

impl StaticResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) an object's spans.
    pub fn insert(&self, id: SchemaObjectId, spans: Vec<Span>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(id, spans);
        }
    }

    /// Drops an object; subsequent resolution returns `None`.
    pub fn drop_object(&self, id: SchemaObjectId) {
        if let Ok(mut objects) = self.objects.write() {
            objects.remove(&id);
        }
    }
}

#[async_trait]
impl MetadataResolver for StaticResolver {
    async fn resolve(&self, id: SchemaObjectId) -> Result<Option<Vec<Span>>> {
        let objects = self
            .objects
            .read()
            .map_err(|_| Error::internal("lock poisoned"))?;
        Ok(objects.get(&id).cloned())
    }
}
