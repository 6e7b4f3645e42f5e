//! Admin editor: a local draft of the channel collection
//!
//! Edits never touch the live collection until `publish()` hands the draft
//! back to the shell, which commits it to the store.

use crate::m3u_import::parse_m3u;
use crate::models::Channel;

pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone)]
pub struct AdminDraft {
    original: Vec<Channel>,
    channels: Vec<Channel>,
    selected: Option<String>,
}

impl AdminDraft {
    pub fn new(channels: &[Channel]) -> Self {
        Self {
            original: channels.to_vec(),
            channels: channels.to_vec(),
            selected: channels.first().map(|c| c.id.clone()),
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn selected(&self) -> Option<&Channel> {
        let id = self.selected.as_deref()?;
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn select(&mut self, id: &str) {
        if self.channels.iter().any(|c| c.id == id) {
            self.selected = Some(id.to_string());
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.channels != self.original
    }

    /// An id not used by any draft channel
    fn fresh_id(&self) -> String {
        let base = format!("ch-{}", chrono::Utc::now().timestamp_millis());
        let mut id = base.clone();
        let mut n = 1;
        while self.channels.iter().any(|c| c.id == id) {
            n += 1;
            id = format!("{}-{}", base, n);
        }
        id
    }

    /// Append a blank channel and select it
    pub fn create(&mut self) -> String {
        let id = self.fresh_id();
        self.channels.push(Channel {
            id: id.clone(),
            name: "New Channel".to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            ..Default::default()
        });
        self.selected = Some(id.clone());
        id
    }

    /// Copy a channel right after the original
    pub fn duplicate(&mut self, id: &str) -> Option<String> {
        let pos = self.channels.iter().position(|c| c.id == id)?;
        let new_id = self.fresh_id();
        let mut copy = self.channels[pos].clone();
        copy.id = new_id.clone();
        copy.name = format!("{} (Copy)", copy.name);
        self.channels.insert(pos + 1, copy);
        self.selected = Some(new_id.clone());
        Some(new_id)
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let Some(pos) = self.channels.iter().position(|c| c.id == id) else {
            return false;
        };
        self.channels.remove(pos);
        if self.selected.as_deref() == Some(id) {
            let next = pos.min(self.channels.len().saturating_sub(1));
            self.selected = self.channels.get(next).map(|c| c.id.clone());
        }
        true
    }

    /// Mutate one draft channel in place; the id itself is not editable
    pub fn update(&mut self, id: &str, edit: impl FnOnce(&mut Channel)) -> bool {
        let Some(channel) = self.channels.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        edit(channel);
        channel.id = id.to_string();
        true
    }

    pub fn discard(&mut self) {
        self.channels = self.original.clone();
        if self.selected().is_none() {
            self.selected = self.channels.first().map(|c| c.id.clone());
        }
    }

    /// Merge the draft onto the live collection for committing.
    ///
    /// Fields the draft left untouched take the live value, so favorites and
    /// ratings changed on the Watch tab since the draft was opened survive.
    /// The merged list becomes the new baseline.
    pub fn publish(&mut self, live: &[Channel]) -> Vec<Channel> {
        let merged: Vec<Channel> = self
            .channels
            .iter()
            .map(|draft| {
                let base = self.original.iter().find(|c| c.id == draft.id);
                let current = live.iter().find(|c| c.id == draft.id);
                match (base, current) {
                    (Some(base), Some(current)) => merge_channel(base, draft, current),
                    _ => draft.clone(),
                }
            })
            .collect();
        self.original = merged.clone();
        self.channels = merged.clone();
        merged
    }

    /// Append channels from an M3U playlist, returns how many were added
    pub fn import_m3u(&mut self, content: &str) -> usize {
        let entries = parse_m3u(content);
        let count = entries.len();
        for entry in entries {
            let id = entry
                .tvg_id
                .filter(|id| !id.is_empty() && !self.channels.iter().any(|c| &c.id == id))
                .unwrap_or_else(|| self.fresh_id());
            self.channels.push(Channel {
                id,
                name: entry.name,
                category: entry.group.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                video_url: entry.url,
                thumbnail: entry.tvg_logo.unwrap_or_default(),
                ..Default::default()
            });
        }
        count
    }

    /// Replace the draft with a JSON array of channels
    pub fn import_json(&mut self, content: &str) -> Result<usize, String> {
        let channels: Vec<Channel> =
            serde_json::from_str(content).map_err(|e| format!("Invalid channel JSON: {}", e))?;

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = channels.iter().find(|c| !seen.insert(c.id.as_str())) {
            return Err(format!("Duplicate channel id '{}'", dup.id));
        }

        self.channels = channels;
        self.selected = self.channels.first().map(|c| c.id.clone());
        Ok(self.channels.len())
    }

    pub fn export_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(&self.channels).map_err(|e| e.to_string())
    }
}

fn pick<T: PartialEq + Clone>(base: &T, draft: &T, live: &T) -> T {
    if draft != base {
        draft.clone()
    } else {
        live.clone()
    }
}

fn merge_channel(base: &Channel, draft: &Channel, live: &Channel) -> Channel {
    Channel {
        id: draft.id.clone(),
        name: pick(&base.name, &draft.name, &live.name),
        category: pick(&base.category, &draft.category, &live.category),
        description: pick(&base.description, &draft.description, &live.description),
        video_url: pick(&base.video_url, &draft.video_url, &live.video_url),
        thumbnail: pick(&base.thumbnail, &draft.thumbnail, &live.thumbnail),
        current_program: pick(&base.current_program, &draft.current_program, &live.current_program),
        rating: pick(&base.rating, &draft.rating, &live.rating),
        is_favorite: pick(&base.is_favorite, &draft.is_favorite, &live.is_favorite),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(id: &str, name: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: name.to_string(),
            category: "News".to_string(),
            video_url: format!("http://example.com/{}.m3u8", id),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_appends_unique_channel() {
        let mut draft = AdminDraft::new(&[ch("a", "A")]);
        let first = draft.create();
        let second = draft.create();
        assert_ne!(first, second);
        assert_eq!(draft.channels().len(), 3);
        assert_eq!(draft.selected_id(), Some(second.as_str()));
        assert_eq!(draft.selected().unwrap().category, DEFAULT_CATEGORY);
        assert!(draft.is_dirty());
    }

    #[test]
    fn test_duplicate_inserts_after_original() {
        let mut draft = AdminDraft::new(&[ch("a", "A"), ch("b", "B")]);
        let copy = draft.duplicate("a").unwrap();
        let names: Vec<&str> = draft.channels().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "A (Copy)", "B"]);
        assert_eq!(draft.channels()[1].id, copy);
        assert_eq!(draft.channels()[1].video_url, draft.channels()[0].video_url);
        assert!(draft.duplicate("missing").is_none());
    }

    #[test]
    fn test_delete_moves_selection() {
        let mut draft = AdminDraft::new(&[ch("a", "A"), ch("b", "B"), ch("c", "C")]);
        draft.select("c");
        assert!(draft.delete("c"));
        assert_eq!(draft.selected_id(), Some("b"));
        assert!(!draft.delete("c"));
        draft.delete("a");
        draft.delete("b");
        assert_eq!(draft.selected_id(), None);
    }

    #[test]
    fn test_update_keeps_id() {
        let mut draft = AdminDraft::new(&[ch("a", "A")]);
        assert!(draft.update("a", |c| {
            c.name = "Renamed".to_string();
            c.id = "hijack".to_string();
        }));
        assert_eq!(draft.channels()[0].id, "a");
        assert_eq!(draft.channels()[0].name, "Renamed");
        assert!(!draft.update("zzz", |_| {}));
    }

    #[test]
    fn test_discard_and_publish() {
        let mut draft = AdminDraft::new(&[ch("a", "A")]);
        draft.update("a", |c| c.name = "Edited".to_string());
        draft.discard();
        assert_eq!(draft.channels()[0].name, "A");
        assert!(!draft.is_dirty());

        draft.create();
        let published = draft.publish(&[ch("a", "A")]);
        assert_eq!(published.len(), 2);
        assert!(!draft.is_dirty());
    }

    #[test]
    fn test_publish_keeps_live_favorites_and_ratings() {
        let live_at_open = [ch("a", "A"), ch("b", "B"), ch("c", "C")];
        let mut draft = AdminDraft::new(&live_at_open);
        draft.update("a", |c| c.name = "Edited".to_string());
        draft.delete("c");

        // Watch tab changes made while the draft was open
        let mut live = live_at_open.to_vec();
        live[0].rating = Some(4);
        live[1].is_favorite = Some(true);

        let published = draft.publish(&live);
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].name, "Edited");
        assert_eq!(published[0].rating, Some(4));
        assert_eq!(published[1].is_favorite, Some(true));
        assert!(!draft.is_dirty());
        assert_eq!(draft.channels(), published.as_slice());
    }

    #[test]
    fn test_publish_prefers_draft_edits_of_same_field() {
        let mut draft = AdminDraft::new(&[ch("a", "A")]);
        draft.update("a", |c| c.rating = Some(2));
        let mut live = vec![ch("a", "A")];
        live[0].rating = Some(5);
        assert_eq!(draft.publish(&live)[0].rating, Some(2));
    }

    #[test]
    fn test_import_m3u_maps_group_to_category() {
        let mut draft = AdminDraft::new(&[]);
        let added = draft.import_m3u(
            "#EXTM3U\n#EXTINF:-1 tvg-logo=\"http://l/x.png\" group-title=\"Sports\",Sport One\nhttp://s/1.m3u8\n#EXTINF:-1,Plain\nhttp://s/2.mp4\n",
        );
        assert_eq!(added, 2);
        let channels = draft.channels();
        assert_eq!(channels[0].category, "Sports");
        assert_eq!(channels[0].thumbnail, "http://l/x.png");
        assert_eq!(channels[1].category, DEFAULT_CATEGORY);
        assert_ne!(channels[0].id, channels[1].id);
    }

    #[test]
    fn test_import_m3u_uses_free_tvg_id() {
        let mut draft = AdminDraft::new(&[ch("taken", "Existing")]);
        let added = draft.import_m3u(
            "#EXTM3U
#EXTINF:-1 tvg-id=\"sport.one\",Sport One
http://s/1.m3u8
#EXTINF:-1 tvg-id=\"taken\",Clash
http://s/2.m3u8
",
        );
        assert_eq!(added, 2);
        let channels = draft.channels();
        assert_eq!(channels[1].id, "sport.one");
        assert_ne!(channels[2].id, "taken");
        assert_eq!(channels[2].name, "Clash");
    }

    #[test]
    fn test_import_json_rejects_duplicate_ids() {
        let mut draft = AdminDraft::new(&[ch("keep", "Keep")]);
        let json = serde_json::to_string(&vec![ch("x", "X"), ch("x", "Y")]).unwrap();
        assert!(draft.import_json(&json).is_err());
        assert_eq!(draft.channels()[0].id, "keep");

        let json = draft.export_json().unwrap();
        let mut other = AdminDraft::new(&[]);
        assert_eq!(other.import_json(&json), Ok(1));
        assert_eq!(other.channels()[0].id, "keep");
    }
}
