use crate::registry::{BaseType, TypeKey};

/// An object the router can dispatch operations against.
///
/// Applications usually implement this on a closed enum of their domain
/// types, so that handlers select behaviour by matching on the variant.
/// Cloning must be cheap or share state: the managing object is cloned into
/// every request that does not name an explicit target.
pub trait Object: Clone + Send + Sync + 'static {
    /// Description of the concrete type behind this value.
    fn base_type(&self) -> BaseType;

    /// Display name echoed in result envelopes.
    fn label(&self) -> Option<String>;

    /// Registry key of the concrete type behind this value.
    fn type_key(&self) -> TypeKey {
        self.base_type().key
    }
}
