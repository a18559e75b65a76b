pub(crate) mod id;
pub(crate) mod issue;
pub(crate) mod layout;
pub(crate) mod roster;
