//! Typed ids and handles for engine-owned resources.
//!
//! A handle never gives access to the resource itself. Once added, inputs,
//! outputs, effects and mixers live in registries owned by the engine
//! thread; the caller keeps only an id plus a liveness token that the engine
//! watches to know when nobody outside can refer to the resource anymore.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mixdeck_core::HandleKind;

/// Marker trait tying an id type to its resource kind.
pub trait ResourceKind: Send + Sync + 'static {
    const KIND: HandleKind;
}

/// Marker for audio inputs.
#[derive(Debug)]
pub enum InputKind {}

/// Marker for audio outputs.
#[derive(Debug)]
pub enum OutputKind {}

/// Marker for effects.
#[derive(Debug)]
pub enum EffectKind {}

/// Marker for mixers.
#[derive(Debug)]
pub enum MixerKind {}

impl ResourceKind for InputKind {
    const KIND: HandleKind = HandleKind::Input;
}

impl ResourceKind for OutputKind {
    const KIND: HandleKind = HandleKind::Output;
}

impl ResourceKind for EffectKind {
    const KIND: HandleKind = HandleKind::Effect;
}

impl ResourceKind for MixerKind {
    const KIND: HandleKind = HandleKind::Mixer;
}

/// Id of a resource of kind `K`, unique within one engine.
pub struct ResourceId<K> {
    raw: u64,
    _kind: PhantomData<fn() -> K>,
}

pub type InputId = ResourceId<InputKind>;
pub type OutputId = ResourceId<OutputKind>;
pub type EffectId = ResourceId<EffectKind>;
pub type MixerId = ResourceId<MixerKind>;

impl<K> ResourceId<K> {
    pub(crate) const fn new(raw: u64) -> Self {
        Self {
            raw,
            _kind: PhantomData,
        }
    }

    /// The numeric value of the id.
    pub const fn raw(self) -> u64 {
        self.raw
    }
}

// Manual impls: deriving would require the same traits on the marker type.
impl<K> Clone for ResourceId<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for ResourceId<K> {}

impl<K> PartialEq for ResourceId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K> Eq for ResourceId<K> {}

impl<K> Hash for ResourceId<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K: ResourceKind> fmt::Debug for ResourceId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", K::KIND, self.raw)
    }
}

impl<K: ResourceKind> fmt::Display for ResourceId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", K::KIND, self.raw)
    }
}

/// Identity of one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(u64);

impl EngineId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Shared liveness marker.
///
/// The engine keeps one copy in its registry; every handle held by a caller
/// (or carried by a queued command) keeps another.
#[derive(Debug, Clone, Default)]
pub(crate) struct Token(Arc<()>);

impl Token {
    /// True once the registry's copy is the only one left.
    pub(crate) fn is_orphaned(&self) -> bool {
        Arc::strong_count(&self.0) == 1
    }

    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Caller-side reference to an engine resource.
///
/// Cloning is cheap and any clone may be dropped from any thread. Equality
/// requires the same id and the same liveness token.
pub struct Handle<K> {
    id: ResourceId<K>,
    engine: EngineId,
    token: Token,
}

pub type InputHandle = Handle<InputKind>;
pub type OutputHandle = Handle<OutputKind>;
pub type EffectHandle = Handle<EffectKind>;
pub type MixerHandle = Handle<MixerKind>;

impl<K> Handle<K> {
    pub(crate) fn new(id: ResourceId<K>, engine: EngineId) -> (Self, Token) {
        let token = Token::default();
        let handle = Self {
            id,
            engine,
            token: token.clone(),
        };
        (handle, token)
    }

    pub const fn id(&self) -> ResourceId<K> {
        self.id
    }

    pub(crate) const fn engine(&self) -> EngineId {
        self.engine
    }
}

impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            engine: self.engine,
            token: self.token.clone(),
        }
    }
}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.token.same(&other.token)
    }
}

impl<K> Eq for Handle<K> {}

impl<K: ResourceKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

/// Hands out ids for one engine.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub(crate) const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn next<K>(&self) -> ResourceId<K> {
        ResourceId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_tracks_handles() {
        let engine = EngineId::next();
        let (handle, token) = InputHandle::new(InputId::new(1), engine);
        assert!(!token.is_orphaned());

        let copy = handle.clone();
        drop(handle);
        assert!(!token.is_orphaned());

        drop(copy);
        assert!(token.is_orphaned());
    }

    #[test]
    fn test_equality_needs_same_token() {
        let engine = EngineId::next();
        let (a, _ta) = MixerHandle::new(MixerId::new(7), engine);
        let (b, _tb) = MixerHandle::new(MixerId::new(7), engine);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_ids_are_distinct_and_typed() {
        let ids = IdAllocator::new();
        let input: InputId = ids.next();
        let output: OutputId = ids.next();
        assert_ne!(input.raw(), output.raw());
        assert_eq!(input.to_string(), format!("input #{}", input.raw()));
    }

    #[test]
    fn test_engine_ids_unique() {
        assert_ne!(EngineId::next(), EngineId::next());
    }
}
