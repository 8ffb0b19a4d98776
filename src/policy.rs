use crate::{errors::RequestError, models::Actor};

/// Owners may mutate their own posts and comments; admins may mutate anything.
pub fn can_mutate(actor: &Actor, owner_id: i64) -> bool {
    actor.id == owner_id || actor.is_admin
}

pub fn ensure_can_mutate(actor: &Actor, owner_id: i64) -> Result<(), RequestError> {
    if can_mutate(actor, owner_id) {
        Ok(())
    } else {
        Err(RequestError::Forbidden("Not authorized"))
    }
}

pub fn ensure_can_moderate(actor: &Actor) -> Result<(), RequestError> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(RequestError::Forbidden("Admin privileges required"))
    }
}
