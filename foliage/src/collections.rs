//! Named groups of scene objects.
//!
//! Placeholders live in one collection and the copies of each source mesh in
//! another. Placement code receives the repository as an argument.

use std::collections::HashMap;

use bevy::prelude::*;

/// Identifies a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKey {
    /// The placeholder set shared by every source mesh.
    Placeholders,
    /// Copies of one source mesh.
    Copies(Entity),
}

#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub members: Vec<Entity>,
    pub hidden: bool,
}

pub trait CollectionRepository {
    fn contains(&self, key: CollectionKey) -> bool;

    fn get_or_create(&mut self, key: CollectionKey) -> &mut Collection;

    /// Empty the collection, returning the members so the caller can despawn them.
    fn clear(&mut self, key: CollectionKey) -> Vec<Entity>;

    /// Members in link order. Missing collections list as empty.
    fn list(&self, key: CollectionKey) -> &[Entity];

    fn link(&mut self, key: CollectionKey, entity: Entity) {
        self.get_or_create(key).members.push(entity);
    }

    fn is_hidden(&self, key: CollectionKey) -> bool;

    /// Every collection that exists, in no particular order.
    fn keys(&self) -> Vec<CollectionKey>;

    fn set_hidden(&mut self, key: CollectionKey, hidden: bool) {
        self.get_or_create(key).hidden = hidden;
    }
}

/// In-memory collection store.
#[derive(Resource, Debug, Default)]
pub struct SceneCollections {
    collections: HashMap<CollectionKey, Collection>,
}

impl CollectionRepository for SceneCollections {
    fn contains(&self, key: CollectionKey) -> bool {
        self.collections.contains_key(&key)
    }

    fn get_or_create(&mut self, key: CollectionKey) -> &mut Collection {
        self.collections.entry(key).or_insert_with(|| {
            debug!("Creating collection {:?}", key);
            Collection::default()
        })
    }

    fn clear(&mut self, key: CollectionKey) -> Vec<Entity> {
        self.collections
            .get_mut(&key)
            .map(|c| std::mem::take(&mut c.members))
            .unwrap_or_default()
    }

    fn list(&self, key: CollectionKey) -> &[Entity] {
        self.collections
            .get(&key)
            .map(|c| c.members.as_slice())
            .unwrap_or(&[])
    }

    fn is_hidden(&self, key: CollectionKey) -> bool {
        self.collections.get(&key).is_some_and(|c| c.hidden)
    }

    fn keys(&self) -> Vec<CollectionKey> {
        self.collections.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_and_link() {
        let mut world = World::new();
        let a = world.spawn_empty().id();
        let b = world.spawn_empty().id();

        let mut repo = SceneCollections::default();
        assert!(!repo.contains(CollectionKey::Placeholders));
        assert!(repo.list(CollectionKey::Placeholders).is_empty());

        repo.link(CollectionKey::Placeholders, a);
        repo.link(CollectionKey::Placeholders, b);
        assert!(repo.contains(CollectionKey::Placeholders));
        assert_eq!(repo.list(CollectionKey::Placeholders), &[a, b]);

        // Keys are independent
        assert!(repo.list(CollectionKey::Copies(a)).is_empty());
    }

    #[test]
    fn test_clear_keeps_collection() {
        let mut world = World::new();
        let source = world.spawn_empty().id();
        let copy = world.spawn_empty().id();

        let mut repo = SceneCollections::default();
        repo.link(CollectionKey::Copies(source), copy);
        repo.set_hidden(CollectionKey::Copies(source), true);

        let removed = repo.clear(CollectionKey::Copies(source));
        assert_eq!(removed, vec![copy]);
        assert!(repo.contains(CollectionKey::Copies(source)));
        assert!(repo.list(CollectionKey::Copies(source)).is_empty());
        assert!(repo.is_hidden(CollectionKey::Copies(source)));

        // Clearing a missing collection is a no-op
        assert!(repo.clear(CollectionKey::Placeholders).is_empty());
        assert!(!repo.contains(CollectionKey::Placeholders));
        assert_eq!(repo.keys(), vec![CollectionKey::Copies(source)]);
    }
}
