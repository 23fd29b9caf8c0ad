use std::collections::HashMap;

use parking_lot::RwLock;

/// File bytes transferred from a secondary instance (or from the CLI at startup).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverPayload {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// 8 random bytes, hex-encoded.
pub fn generate_id() -> String {
    let bytes: [u8; 8] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Default)]
pub struct FileStore {
    entries: RwLock<HashMap<String, HandoverPayload>>,
}

impl FileStore {
    pub fn put(&self, id: impl Into<String>, payload: HandoverPayload) {
        self.entries.write().insert(id.into(), payload);
    }

    pub fn insert(&self, payload: HandoverPayload) -> String {
        let id = generate_id();
        self.put(id.clone(), payload);
        id
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<HandoverPayload> {
        self.entries.read().get(id).cloned()
    }

    /// Removes the entry; handed-over files are served once.
    pub fn take(&self, id: &str) -> Option<HandoverPayload> {
        self.entries.write().remove(id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct RenderStore {
    entries: RwLock<HashMap<String, String>>,
}

impl RenderStore {
    pub fn put(&self, token: impl Into<String>, html: String) {
        self.entries.write().insert(token.into(), html);
    }

    pub fn get(&self, token: &str) -> Option<String> {
        self.entries.read().get(token).cloned()
    }

    pub fn delete(&self, token: &str) {
        self.entries.write().remove(token);
    }

    /// Stores `html` under a fresh token. The entry lives exactly as long as the ticket.
    pub fn issue(&self, html: String) -> RenderTicket<'_> {
        let token = generate_id();
        self.put(token.clone(), html);
        RenderTicket { store: self, token }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RenderTicket<'a> {
    store: &'a RenderStore,
    token: String,
}

impl RenderTicket<'_> {
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for RenderTicket<'_> {
    fn drop(&mut self) {
        self.store.delete(&self.token);
    }
}
