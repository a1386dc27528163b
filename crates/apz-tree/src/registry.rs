#![forbid(unsafe_code)]

//! Identity-keyed controller arena.
//!
//! [`ControllerRegistry`] owns every live [`ScrollController`]. Hit-test nodes
//! and input blocks refer to controllers through [`ControllerHandle`]s, which
//! are plain `(index, generation)` pairs: a handle to a retired controller
//! simply stops resolving, so nothing dangles and nothing is reference
//! counted.
//!
//! # Invariants
//!
//! 1. No two live controllers share a [`ScrollNodeId`].
//! 2. A handle resolves only while the controller it was issued for is live.
//!    Slot reuse bumps the slot generation.
//! 3. `get_or_create` never touches the geometry of an existing controller.

use ahash::{AHashMap, AHashSet};
use apz_core::{GestureConfig, ScrollGeometry, ScrollNodeId};

use crate::controller::ScrollController;

/// Non-owning reference to a controller in a [`ControllerRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControllerHandle {
    index: u32,
    generation: u32,
}

impl ControllerHandle {
    /// Arena slot index, for diagnostics.
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    controller: Option<ScrollController>,
}

/// Arena of scroll controllers keyed by scroll node identity.
#[derive(Debug, Default)]
pub struct ControllerRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: AHashMap<ScrollNodeId, ControllerHandle>,
    gesture: GestureConfig,
}

impl ControllerRegistry {
    pub fn new(gesture: GestureConfig) -> Self {
        Self {
            gesture,
            ..Self::default()
        }
    }

    /// Handle of the live controller for `id`.
    pub fn get(&self, id: ScrollNodeId) -> Option<ControllerHandle> {
        self.by_id.get(&id).copied()
    }

    /// Existing controller for `id`, or a new one seeded from `hint`.
    ///
    /// The second element is `true` when a controller was created.
    pub fn get_or_create(
        &mut self,
        id: ScrollNodeId,
        hint: &ScrollGeometry,
        is_root_content: bool,
    ) -> (ControllerHandle, bool) {
        if let Some(handle) = self.get(id) {
            return (handle, false);
        }
        let controller = ScrollController::new(id, hint, is_root_content, self.gesture.clone());
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.controller = Some(controller);
                ControllerHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    controller: Some(controller),
                });
                ControllerHandle {
                    index,
                    generation: 0,
                }
            }
        };
        self.by_id.insert(id, handle);
        tracing::debug!(message = "apz.controller.create", id = %id, slot = handle.index);
        (handle, true)
    }

    pub fn controller(&self, handle: ControllerHandle) -> Option<&ScrollController> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.controller.as_ref()
    }

    pub fn controller_mut(&mut self, handle: ControllerHandle) -> Option<&mut ScrollController> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.controller.as_mut()
    }

    /// Controller for `id`, if live.
    pub fn by_identity(&self, id: ScrollNodeId) -> Option<&ScrollController> {
        self.get(id).and_then(|h| self.controller(h))
    }

    pub fn by_identity_mut(&mut self, id: ScrollNodeId) -> Option<&mut ScrollController> {
        let handle = self.get(id)?;
        self.controller_mut(handle)
    }

    /// Whether `handle` still resolves.
    #[inline]
    pub fn is_live(&self, handle: ControllerHandle) -> bool {
        self.controller(handle).is_some()
    }

    /// Destroy the controller for `id`, releasing its gesture state.
    pub fn retire(&mut self, id: ScrollNodeId) -> Option<ControllerHandle> {
        let handle = self.by_id.remove(&id)?;
        let slot = self.slots.get_mut(handle.index as usize)?;
        if let Some(mut controller) = slot.controller.take() {
            controller.clear_gesture_state();
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        tracing::debug!(message = "apz.controller.retire", id = %id, slot = handle.index);
        Some(handle)
    }

    /// Destroy every controller whose identity is not in `touched`.
    ///
    /// Returns the retired identities with the handles they had, in identity
    /// order.
    pub fn retire_unused(
        &mut self,
        touched: &AHashSet<ScrollNodeId>,
    ) -> Vec<(ScrollNodeId, ControllerHandle)> {
        let mut stale: Vec<ScrollNodeId> = self
            .by_id
            .keys()
            .filter(|id| !touched.contains(id))
            .copied()
            .collect();
        stale.sort_unstable();
        stale
            .into_iter()
            .filter_map(|id| self.retire(id).map(|h| (id, h)))
            .collect()
    }

    /// Number of live controllers.
    #[inline]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Live controllers in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ControllerHandle, &ScrollController)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.controller.as_ref().map(|c| {
                (
                    ControllerHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    c,
                )
            })
        })
    }

    /// Handles of every live controller, in slot order.
    pub fn handles(&self) -> Vec<ControllerHandle> {
        self.iter().map(|(h, _)| h).collect()
    }

    pub fn gesture_config(&self) -> &GestureConfig {
        &self.gesture
    }

    /// Replace the tap thresholds for existing and future controllers.
    pub fn set_gesture_config(&mut self, gesture: GestureConfig) {
        for slot in &mut self.slots {
            if let Some(c) = slot.controller.as_mut() {
                c.set_gesture_config(gesture.clone());
            }
        }
        self.gesture = gesture;
    }
}
