pub(crate) mod allocation;
pub(crate) mod normalize;
pub(crate) mod platform;
pub(crate) mod reconcile;
pub(crate) mod release;
pub(crate) mod sync;
pub(crate) mod templates;
