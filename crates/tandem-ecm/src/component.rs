//! The [`Component`] trait and its type-erased counterpart.

use std::any::Any;
use std::fmt;

use tandem_core::ComponentTypeId;

use crate::storage::{ComponentStorage, TypedStorage};

/// Typed data attachable to an entity.
///
/// `NAME` must be stable across builds and processes: it is hashed into
/// [`TYPE_ID`](Self::TYPE_ID), and secondaries and the primary match state
/// deltas by that id. A dotted namespace (`"myplugin.JointVelocity"`)
/// keeps names from colliding between plugins.
///
/// # Examples
///
/// ```
/// use tandem_ecm::{Component, ComponentTypeId};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Velocity(f64);
///
/// impl Component for Velocity {
///     const NAME: &'static str = "example.Velocity";
/// }
///
/// assert_eq!(Velocity::TYPE_ID, ComponentTypeId::from_name("example.Velocity"));
/// ```
pub trait Component: Clone + fmt::Debug + Send + Sync + 'static {
    /// Stable, process-independent component name.
    const NAME: &'static str;

    /// Type id derived from [`NAME`](Self::NAME).
    const TYPE_ID: ComponentTypeId = ComponentTypeId::from_name(Self::NAME);
}

/// Object-safe view of a component value whose type is only known at runtime.
///
/// Used wherever components arrive without a static type: world
/// descriptions, state deltas from secondaries, and the erased creation
/// path of the manager. Implemented for every [`Component`].
pub trait ComponentValue: Any + Send + Sync {
    /// The value's component type id.
    fn component_type(&self) -> ComponentTypeId;

    /// The value's stable component name.
    fn component_name(&self) -> &'static str;

    /// Clone into a new box.
    fn clone_value(&self) -> Box<dyn ComponentValue>;

    /// Build an empty storage able to hold values of this type.
    fn new_storage(&self) -> Box<dyn ComponentStorage>;

    /// Borrow as [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Convert into a boxed [`Any`] for by-value downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;

    /// Debug-format the inner value.
    fn fmt_value(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T: Component> ComponentValue for T {
    fn component_type(&self) -> ComponentTypeId {
        T::TYPE_ID
    }

    fn component_name(&self) -> &'static str {
        T::NAME
    }

    fn clone_value(&self) -> Box<dyn ComponentValue> {
        Box::new(self.clone())
    }

    fn new_storage(&self) -> Box<dyn ComponentStorage> {
        Box::new(TypedStorage::<T>::new())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn fmt_value(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Debug for dyn ComponentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.component_name())?;
        self.fmt_value(f)?;
        write!(f, ")")
    }
}

impl Clone for Box<dyn ComponentValue> {
    fn clone(&self) -> Self {
        self.clone_value()
    }
}

/// Downcast a boxed value to `T`, handing the box back on mismatch.
pub(crate) fn downcast_value<T: Component>(
    value: Box<dyn ComponentValue>,
) -> Result<T, Box<dyn ComponentValue>> {
    if !value.as_any().is::<T>() {
        return Err(value);
    }
    match value.into_any().downcast::<T>() {
        Ok(typed) => Ok(*typed),
        // `is::<T>()` was checked above; the conversion cannot change the type.
        Err(_) => unreachable!("value changed type during downcast"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Speed(f32);

    impl Component for Speed {
        const NAME: &'static str = "test.Speed";
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Label(String);

    impl Component for Label {
        const NAME: &'static str = "test.Label";
    }

    #[test]
    fn erased_value_reports_its_type() {
        let value: Box<dyn ComponentValue> = Box::new(Speed(1.5));
        assert_eq!(value.component_type(), Speed::TYPE_ID);
        assert_eq!(value.component_name(), "test.Speed");
        assert_eq!(format!("{value:?}"), "test.Speed(Speed(1.5))");
    }

    #[test]
    fn downcast_round_trips_matching_type() {
        let value: Box<dyn ComponentValue> = Box::new(Speed(2.0));
        assert_eq!(downcast_value::<Speed>(value).unwrap(), Speed(2.0));
    }

    #[test]
    fn downcast_mismatch_returns_original() {
        let value: Box<dyn ComponentValue> = Box::new(Label("x".into()));
        let back = downcast_value::<Speed>(value).unwrap_err();
        assert_eq!(back.component_type(), Label::TYPE_ID);
    }

    #[test]
    fn boxed_values_clone() {
        let value: Box<dyn ComponentValue> = Box::new(Label("a".into()));
        let copy = value.clone();
        assert_eq!(copy.as_any().downcast_ref::<Label>(), Some(&Label("a".into())));
    }
}
