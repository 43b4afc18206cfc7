//! Process-wide id categories.
//!
//! Each category (a marker type) gets its own numbering space, created
//! lazily on first use and shared by every [`Uid`]/[`Sid`] of that category.
//!
//! [`Uid`]: crate::handle::Uid
//! [`Sid`]: crate::handle::Sid

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::handle::id::{Id, IdManager};

/// Per-category state: the numbering space plus refcounts for shared
/// handles.
#[derive(Default)]
pub(crate) struct Category {
    /// The category's numbering space.
    pub(crate) manager: IdManager,
    /// Live shared-handle refcounts, keyed by id value.
    pub(crate) refcounts: HashMap<Id, usize>,
}

/// Runs `f` with exclusive access to the category state for `T`.
///
/// The registry is created on first use; categories are never torn down
/// before process end.
pub(crate) fn with_category<T: 'static, R>(f: impl FnOnce(&mut Category) -> R) -> R {
    static REGISTRY: OnceLock<Mutex<HashMap<TypeId, Category>>> = OnceLock::new();
    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let mut categories = registry.lock();
    f(categories.entry(TypeId::of::<T>()).or_default())
}
