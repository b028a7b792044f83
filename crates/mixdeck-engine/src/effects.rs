//! Engine-owned effect registry.

use std::collections::HashMap;

use mixdeck_core::{BypassEffect, Effect, Error, HandleKind, Result};
use tracing::debug;

use crate::handle::{EffectId, Token};

struct RegisteredEffect {
    effect: Box<dyn Effect>,
    token: Token,
    /// Number of tracks, tails and mixers currently driving this effect.
    /// Never more than one.
    use_count: usize,
}

/// All effects added to an engine, keyed by id.
#[derive(Default)]
pub(crate) struct EffectRegistry {
    effects: HashMap<EffectId, RegisteredEffect>,
}

impl EffectRegistry {
    pub(crate) fn insert(&mut self, id: EffectId, effect: Box<dyn Effect>, token: Token) {
        self.effects.insert(
            id,
            RegisteredEffect {
                effect,
                token,
                use_count: 0,
            },
        );
    }

    pub(crate) fn get(&self, id: EffectId) -> Option<&dyn Effect> {
        self.effects.get(&id).map(|e| e.effect.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: EffectId) -> Option<&mut (dyn Effect + 'static)> {
        self.effects.get_mut(&id).map(|e| e.effect.as_mut())
    }

    /// Claim an effect for a track or mixer. Each effect drives at most one
    /// signal path at a time.
    pub(crate) fn acquire(&mut self, id: EffectId) -> Result<()> {
        let entry = self
            .effects
            .get_mut(&id)
            .ok_or_else(|| Error::unknown(HandleKind::Effect, id.raw()))?;
        if entry.use_count > 0 {
            return Err(Error::EffectInUse(id.raw()));
        }
        entry.use_count += 1;
        Ok(())
    }

    pub(crate) fn release(&mut self, id: EffectId) {
        if let Some(entry) = self.effects.get_mut(&id) {
            entry.use_count = entry.use_count.saturating_sub(1);
        }
    }

    /// Drop every effect that is unused and that no caller can name anymore.
    pub(crate) fn collect(&mut self) {
        self.effects.retain(|id, entry| {
            let dead = entry.use_count == 0 && entry.token.is_orphaned();
            if dead {
                debug!("Collected {id}");
            }
            !dead
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.effects.len()
    }
}

/// The effect driving one track, tail or mixer.
pub(crate) enum EffectSlot {
    /// Engine-owned format adapter, used when no effect was given.
    Bypass(BypassEffect),
    /// An effect from the registry, claimed through [`EffectRegistry::acquire`].
    Registered(EffectId),
}

impl EffectSlot {
    pub(crate) fn get<'a>(&'a self, effects: &'a EffectRegistry) -> Option<&'a dyn Effect> {
        match self {
            Self::Bypass(bypass) => Some(bypass),
            Self::Registered(id) => effects.get(*id),
        }
    }

    pub(crate) fn get_mut<'a>(
        &'a mut self,
        effects: &'a mut EffectRegistry,
    ) -> Option<&'a mut (dyn Effect + 'static)> {
        match self {
            Self::Bypass(bypass) => Some(bypass),
            Self::Registered(id) => effects.get_mut(*id),
        }
    }

    /// Tail length of the effect in this slot, zero if it is gone.
    pub(crate) fn tail_time(&self, effects: &EffectRegistry) -> u32 {
        self.get(effects).map_or(0, |effect| effect.tail_time())
    }

    /// Give a registered effect back to the registry.
    pub(crate) fn release(self, effects: &mut EffectRegistry) {
        if let Self::Registered(id) = self {
            effects.release(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ResourceId;
    use mixdeck_core::{Frame, FrameFormat, SILENCE};

    fn bypass() -> Box<dyn Effect> {
        Box::new(BypassEffect::new(FrameFormat::Mono, FrameFormat::Stereo))
    }

    #[test]
    fn test_acquire_refuses_second_user() {
        let mut effects = EffectRegistry::default();
        let id: EffectId = ResourceId::new(1);
        let caller = Token::default();
        effects.insert(id, bypass(), caller.clone());

        assert!(effects.acquire(id).is_ok());
        assert!(matches!(effects.acquire(id), Err(Error::EffectInUse(1))));

        effects.release(id);
        assert!(effects.acquire(id).is_ok());
    }

    #[test]
    fn test_acquire_unknown() {
        let mut effects = EffectRegistry::default();
        let err = effects.acquire(ResourceId::new(9)).unwrap_err();
        assert!(err.is_unknown_handle());
    }

    #[test]
    fn test_collect_needs_unused_and_orphaned() {
        let mut effects = EffectRegistry::default();
        let id: EffectId = ResourceId::new(1);
        let registry_token = Token::default();
        let caller = registry_token.clone();
        effects.insert(id, bypass(), registry_token);

        effects.acquire(id).unwrap();
        drop(caller);
        effects.collect();
        assert!(effects.get(id).is_some());

        effects.release(id);
        effects.collect();
        assert!(effects.get(id).is_none());
        assert_eq!(effects.len(), 0);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_slot_dispatch() {
        let mut effects = EffectRegistry::default();
        let bypass = BypassEffect::new(FrameFormat::Mono, FrameFormat::Stereo);
        let mut slot = EffectSlot::Bypass(bypass);
        let mut out: Frame = SILENCE;
        slot.get_mut(&mut effects)
            .unwrap()
            .process(&[0.5, 0.0], &mut out);
        assert_eq!(out, [0.5, 0.5]);
        assert_eq!(slot.tail_time(&effects), 0);

        let missing = EffectSlot::Registered(ResourceId::new(3));
        assert!(missing.get(&effects).is_none());
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_registered_slot_reaches_registry_effect() {
        let mut effects = EffectRegistry::default();
        let id: EffectId = ResourceId::new(4);
        effects.insert(id, bypass(), Token::default());

        let mut out: Frame = SILENCE;
        effects
            .get_mut(id)
            .unwrap()
            .process(&[0.25, 0.0], &mut out);
        assert_eq!(out, [0.25, 0.25]);

        let mut slot = EffectSlot::Registered(id);
        slot.get_mut(&mut effects)
            .unwrap()
            .process(&[0.5, 0.0], &mut out);
        assert_eq!(out, [0.5, 0.5]);
        assert!(effects.get_mut(ResourceId::new(5)).is_none());
    }
}
