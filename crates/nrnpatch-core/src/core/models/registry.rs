use super::facet::Facet;
use super::ids::ObjectId;
use super::kind::ObjectKind;
use crate::core::hoc::{HocRef, Value};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{BTreeMap, HashMap};

/// The host-side record of one foreign object.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub handle: HocRef,
    pub kind: ObjectKind,
    pub template: String,
    rooted: bool,
    references: Vec<ObjectId>,
    /// Peer endpoint to the NetCon connecting this object with it. Only
    /// connectable kinds carry a connection map.
    connections: Option<BTreeMap<ObjectId, ObjectId>>,
    /// Attributes the interpreter did not know, stored on the host side.
    pub locals: HashMap<String, Value>,
    pub facet: Facet,
}

impl ObjectEntry {
    fn new(handle: HocRef, kind: ObjectKind, template: String) -> Self {
        Self {
            handle,
            kind,
            template,
            rooted: false,
            references: Vec::new(),
            connections: kind.is_connectable().then(BTreeMap::new),
            locals: HashMap::new(),
            facet: Facet::None,
        }
    }

    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    pub fn references(&self) -> &[ObjectId] {
        &self.references
    }

    pub fn connections(&self) -> Option<&BTreeMap<ObjectId, ObjectId>> {
        self.connections.as_ref()
    }
}

/// Owns every wrapped foreign object and the references between them.
///
/// Objects stay alive while they are reachable from a root. Roots are the
/// objects handed out to callers; everything else is kept alive only because a
/// rooted object references it, or holds it in its connection map.
#[derive(Debug, Clone, Default)]
pub struct ObjectRegistry {
    entries: SlotMap<ObjectId, ObjectEntry>,
    by_handle: HashMap<HocRef, ObjectId>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a foreign object, or returns its existing identity.
    ///
    /// # Arguments
    ///
    /// * `handle` - The foreign identity of the object.
    /// * `kind` - The wrapper family to use for a new entry.
    /// * `template` - The template the object was created from.
    ///
    /// # Return
    ///
    /// The identity of the entry. Wrapping the same foreign object twice returns
    /// the same identity; a generic entry is upgraded when a specific kind is
    /// requested later.
    pub fn wrap(&mut self, handle: HocRef, kind: ObjectKind, template: &str) -> ObjectId {
        if let Some(&id) = self.by_handle.get(&handle) {
            if let Some(entry) = self.entries.get_mut(id) {
                if entry.kind == ObjectKind::Generic && kind != ObjectKind::Generic {
                    entry.kind = kind;
                    if kind.is_connectable() && entry.connections.is_none() {
                        entry.connections = Some(BTreeMap::new());
                    }
                }
            }
            return id;
        }
        let id = self
            .entries
            .insert(ObjectEntry::new(handle, kind, template.to_string()));
        self.by_handle.insert(handle, id);
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectEntry> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn lookup(&self, handle: HocRef) -> Option<ObjectId> {
        self.by_handle.get(&handle).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &ObjectEntry)> {
        self.entries.iter()
    }

    /// Makes `owner` keep `dependent` alive. Returns `false` when the reference
    /// already existed or either object is unknown.
    pub fn reference(&mut self, owner: ObjectId, dependent: ObjectId) -> bool {
        if !self.entries.contains_key(dependent) {
            return false;
        }
        match self.entries.get_mut(owner) {
            Some(entry) if !entry.references.contains(&dependent) => {
                entry.references.push(dependent);
                true
            }
            _ => false,
        }
    }

    /// Removes a reference. Returns whether one was removed.
    pub fn dereference(&mut self, owner: ObjectId, dependent: ObjectId) -> bool {
        match self.entries.get_mut(owner) {
            Some(entry) => {
                let before = entry.references.len();
                entry.references.retain(|r| *r != dependent);
                entry.references.len() != before
            }
            None => false,
        }
    }

    pub fn references(&self, owner: ObjectId) -> &[ObjectId] {
        self.entries
            .get(owner)
            .map(|e| e.references.as_slice())
            .unwrap_or(&[])
    }

    pub fn root(&mut self, id: ObjectId) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.rooted = true;
        }
    }

    pub fn unroot(&mut self, id: ObjectId) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.rooted = false;
        }
    }

    /// Records that `netcon` connects `from` to `to`.
    pub fn add_connection(&mut self, from: ObjectId, to: ObjectId, netcon: ObjectId) {
        if let Some(map) = self.entries.get_mut(from).and_then(|e| e.connections.as_mut()) {
            map.insert(to, netcon);
        }
    }

    pub fn remove_connection(&mut self, from: ObjectId, to: ObjectId) -> Option<ObjectId> {
        self.entries
            .get_mut(from)
            .and_then(|e| e.connections.as_mut())
            .and_then(|map| map.remove(&to))
    }

    pub fn connection(&self, from: ObjectId, to: ObjectId) -> Option<ObjectId> {
        self.entries
            .get(from)
            .and_then(|e| e.connections.as_ref())
            .and_then(|map| map.get(&to).copied())
    }

    /// Removes every entry that is not reachable from a root.
    ///
    /// # Return
    ///
    /// The removed entries, whose foreign objects the caller must release.
    pub fn sweep(&mut self) -> Vec<(ObjectId, ObjectEntry)> {
        let mut marked: SecondaryMap<ObjectId, ()> = SecondaryMap::new();
        let mut stack: Vec<ObjectId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.rooted)
            .map(|(id, _)| id)
            .collect();

        while let Some(id) = stack.pop() {
            if marked.insert(id, ()).is_some() {
                continue;
            }
            if let Some(entry) = self.entries.get(id) {
                let connected = entry.connections.iter().flat_map(|map| map.values());
                stack.extend(
                    entry
                        .references
                        .iter()
                        .chain(connected)
                        .filter(|r| !marked.contains_key(**r))
                        .copied(),
                );
            }
        }

        let dead: Vec<ObjectId> = self
            .entries
            .keys()
            .filter(|id| !marked.contains_key(*id))
            .collect();
        let mut swept = Vec::with_capacity(dead.len());
        for id in dead {
            if let Some(entry) = self.entries.remove(id) {
                self.by_handle.remove(&entry.handle);
                swept.push((id, entry));
            }
        }

        if !swept.is_empty() {
            for entry in self.entries.values_mut() {
                if let Some(map) = entry.connections.as_mut() {
                    map.retain(|peer, nc| marked.contains_key(*peer) && marked.contains_key(*nc));
                }
            }
        }

        swept
    }
}
