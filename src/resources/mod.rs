pub mod addon_instance;
pub mod common;
pub mod monitoring;
pub mod namespace;
pub mod olm;

pub use common::{
    API_VERSION, CACHE_FINALIZER, FIELD_MANAGER, KIND, has_equal_controller_reference,
    identity_labels, identity_selector, owner_reference,
};
