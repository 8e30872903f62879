use std::any::Any;

/// A value published by a conditions provider.
///
/// Every `'static` type that can be shared across threads is a conditions
/// object; the cache stores them boxed and hands out shared references.
/// Call the methods through `&dyn ConditionsObject`, never on the box
/// itself, which is a conditions object of its own.
pub trait ConditionsObject: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Name of the concrete type, for diagnostics.
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> ConditionsObject for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl dyn ConditionsObject {
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }
}
