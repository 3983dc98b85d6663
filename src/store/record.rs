use crate::events::GroupCreated;

/// A persisted group.
///
/// `id` is assigned by the store at commit time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub id: Option<u64>,
    pub name: String,
    pub is_active: bool,
}

impl Group {
    pub fn new(name: impl Into<String>, is_active: bool) -> Self {
        Self {
            id: None,
            name: name.into(),
            is_active,
        }
    }
}

impl From<GroupCreated> for Group {
    fn from(event: GroupCreated) -> Self {
        Self::new(event.name, event.is_active)
    }
}
