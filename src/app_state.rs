//! Shared application state: the channel collection and the active channel

use crate::models::Channel;
use crate::store::{ChannelStore, StoreError};

pub struct AppState {
    channels: Vec<Channel>,
    active_id: Option<String>,
    store: ChannelStore,
}

impl AppState {
    /// Load the collection and point at `preferred` if it still exists
    pub fn new(store: ChannelStore, preferred: Option<&str>) -> Self {
        let channels = store.load();
        let mut state = Self {
            channels,
            active_id: preferred.map(str::to_string),
            store,
        };
        state.repair_active();
        state
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active_channel(&self) -> Option<&Channel> {
        let id = self.active_id.as_deref()?;
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Keep the active id pointing at an existing channel
    fn repair_active(&mut self) {
        let valid = self
            .active_id
            .as_deref()
            .is_some_and(|id| self.channels.iter().any(|c| c.id == id));
        if !valid {
            self.active_id = self.channels.first().map(|c| c.id.clone());
        }
    }

    /// Switch channels; unknown ids are ignored. Returns whether the active id changed.
    pub fn select(&mut self, id: &str) -> bool {
        if self.active_id.as_deref() == Some(id) || self.get(id).is_none() {
            return false;
        }
        self.active_id = Some(id.to_string());
        true
    }

    fn step(&mut self, forward: bool) -> bool {
        let len = self.channels.len();
        if len == 0 {
            return false;
        }
        let current = self
            .active_id
            .as_deref()
            .and_then(|id| self.channels.iter().position(|c| c.id == id))
            .unwrap_or(0);
        let next = if forward { (current + 1) % len } else { (current + len - 1) % len };
        let id = self.channels[next].id.clone();
        self.select(&id)
    }

    pub fn next_channel(&mut self) -> bool {
        self.step(true)
    }

    pub fn previous_channel(&mut self) -> bool {
        self.step(false)
    }

    pub fn toggle_favorite(&mut self, id: &str) -> Result<Option<bool>, StoreError> {
        let Some(channel) = self.channels.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        let now = !channel.favorite();
        channel.is_favorite = Some(now);
        self.persist()?;
        Ok(Some(now))
    }

    pub fn set_rating(&mut self, id: &str, rating: u8) -> Result<bool, StoreError> {
        let Some(channel) = self.channels.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        channel.set_rating(rating);
        self.persist()?;
        Ok(true)
    }

    /// Replace the collection (admin publish) and re-point the active id if needed
    pub fn commit(&mut self, channels: Vec<Channel>) -> Result<(), StoreError> {
        self.channels = channels;
        self.repair_active();
        self.persist()
    }

    fn persist(&self) -> Result<(), StoreError> {
        self.store.save_all(&self.channels)
    }
}
