use shared_bus::events::EntityCardReady;
use shared_types::{Entity, UNKNOWN_TYPE};

/// Card for `entity`, or `None` when it has no text to show.
#[must_use]
pub fn entity_card(entity: &Entity, relationship_count: usize) -> Option<EntityCardReady> {
    let label = entity.text.trim();
    if label.is_empty() {
        return None;
    }
    let entity_type = match entity.entity_type.trim() {
        "" => UNKNOWN_TYPE,
        t => t,
    };
    Some(EntityCardReady {
        entity_id: entity.id(),
        entity_type: entity_type.to_string(),
        label: label.to_string(),
        relationship_count,
    })
}
