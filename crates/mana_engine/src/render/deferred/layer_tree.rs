//! Editable compositor layer order
//!
//! The editor model behind the layer list: every layer has a unique order
//! value and is either inactive, active or pinned. Pinned layers always draw
//! last, in their relative order, and cannot be disabled or moved. Moving a
//! layer swaps its order value with the nearest active, unpinned neighbour,
//! wrapping around at the ends.

use thiserror::Error;

use super::compositor::Layer;

/// Rejected layer tree edits
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerTreeError {
    /// No layer has this name
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),
    /// Pinned layers cannot be disabled or moved
    #[error("Layer {0} is pinned")]
    Pinned(String),
    /// Inactive layers cannot be moved
    #[error("Layer {0} is inactive")]
    Inactive(String),
}

/// One layer with its selection state
#[derive(Debug, Clone, PartialEq)]
pub struct LayerItem {
    /// Position in the draw order
    pub order: usize,
    /// Drawn at all
    pub active: bool,
    /// Drawn after every unpinned layer
    pub pinned: bool,
    /// The layer
    pub layer: Layer,
}

/// Layers with editable order and state
#[derive(Debug, Clone, Default)]
pub struct LayerTree {
    items: Vec<LayerItem>,
}

impl LayerTree {
    /// Tree of `layers`, all active, ordered as given
    pub fn new(layers: Vec<Layer>) -> Self {
        let mut tree = Self::default();
        tree.set_layers(layers);
        tree
    }

    /// Replace the layers and reset the selection
    pub fn set_layers(&mut self, layers: Vec<Layer>) {
        self.items = layers
            .into_iter()
            .enumerate()
            .map(|(order, layer)| LayerItem {
                order,
                active: true,
                pinned: false,
                layer,
            })
            .collect();
    }

    /// Activate every layer and restore insertion order; pins are kept
    pub fn reset_selection(&mut self) {
        for (order, item) in self.items.iter_mut().enumerate() {
            item.order = order;
            item.active = true;
        }
    }

    /// All items in insertion order
    pub fn items(&self) -> &[LayerItem] {
        &self.items
    }

    /// Item of layer `name`
    pub fn item(&self, name: &str) -> Option<&LayerItem> {
        self.items.iter().find(|item| item.layer.name == name)
    }

    fn index_of(&self, name: &str) -> Result<usize, LayerTreeError> {
        self.items
            .iter()
            .position(|item| item.layer.name == name)
            .ok_or_else(|| LayerTreeError::UnknownLayer(name.to_string()))
    }

    /// Enable or disable layer `name`
    pub fn set_layer_active(&mut self, name: &str, active: bool) -> Result<(), LayerTreeError> {
        let index = self.index_of(name)?;
        let item = &mut self.items[index];
        if item.pinned && !active {
            return Err(LayerTreeError::Pinned(name.to_string()));
        }
        item.active = active;
        Ok(())
    }

    /// Pin or unpin layer `name`; pinning also activates it
    pub fn set_layer_pinned(&mut self, name: &str, pinned: bool) -> Result<(), LayerTreeError> {
        let index = self.index_of(name)?;
        let item = &mut self.items[index];
        item.pinned = pinned;
        if pinned {
            item.active = true;
        }
        Ok(())
    }

    /// Draw layer `name` one step earlier
    pub fn move_up(&mut self, name: &str) -> Result<(), LayerTreeError> {
        self.shift(name, false)
    }

    /// Draw layer `name` one step later
    pub fn move_down(&mut self, name: &str) -> Result<(), LayerTreeError> {
        self.shift(name, true)
    }

    fn shift(&mut self, name: &str, later: bool) -> Result<(), LayerTreeError> {
        let index = self.index_of(name)?;
        let item = &self.items[index];
        if item.pinned {
            return Err(LayerTreeError::Pinned(name.to_string()));
        }
        if !item.active {
            return Err(LayerTreeError::Inactive(name.to_string()));
        }

        let movable = self.sorted(|item| item.active && !item.pinned);
        let Some(position) = movable.iter().position(|candidate| *candidate == index) else {
            return Ok(());
        };
        if movable.len() < 2 {
            return Ok(());
        }
        let neighbour = if later {
            movable[(position + 1) % movable.len()]
        } else {
            movable[(position + movable.len() - 1) % movable.len()]
        };

        let order = self.items[index].order;
        self.items[index].order = self.items[neighbour].order;
        self.items[neighbour].order = order;
        Ok(())
    }

    fn sorted(&self, filter: impl Fn(&LayerItem) -> bool) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.items.len()).filter(|i| filter(&self.items[*i])).collect();
        indices.sort_by_key(|i| self.items[*i].order);
        indices
    }

    /// Draw order: active unpinned layers by order, then pinned layers by order
    pub fn selected_layers(&self) -> Vec<Layer> {
        self.sorted(|item| item.active && !item.pinned)
            .into_iter()
            .chain(self.sorted(|item| item.pinned))
            .map(|index| self.items[index].layer.clone())
            .collect()
    }
}
