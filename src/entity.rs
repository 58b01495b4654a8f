//! Entities and name-based field access.
//!
//! Hydration writes stored columns into entity fields by column name. Instead of
//! reflection, every entity type exposes an explicit accessor pair generated by
//! [`impl_entity!`](crate::impl_entity).

use crate::error::Result;
use crate::value::FieldValue;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a hydrated entity, as held by a repository's identity cache.
pub type EntityRef<E> = Rc<RefCell<E>>;

/// A plain data object corresponding to one table row.
pub trait Entity: Default + 'static {
    /// Type identifier used to look the entity's metadata up.
    fn entity_name() -> &'static str;

    /// Read the field mapped to column `name`.
    fn get_field(&self, name: &str) -> Result<FieldValue>;

    /// Write the field mapped to column `name`.
    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<()>;

    /// Primary key, when the entity has an integer `id` column that is set.
    fn id(&self) -> Option<i64> {
        match self.get_field("id") {
            Ok(FieldValue::Int(id)) => Some(id),
            _ => None,
        }
    }
}

/// Wrap an entity in a fresh shared handle.
pub fn entity_ref<E: Entity>(entity: E) -> EntityRef<E> {
    Rc::new(RefCell::new(entity))
}

/// Implement [`Entity`] for a struct from its field list.
///
/// Each field maps to a column of the same name unless a column name is given
/// with `=>`. Field types must implement [`ToFieldValue`](crate::ToFieldValue)
/// and [`FromFieldValue`](crate::FromFieldValue).
///
/// # Example
///
/// ```
/// use quarry::{impl_entity, Entity, FieldValue};
///
/// #[derive(Debug, Default)]
/// struct Customer {
///     id: Option<i64>,
///     name: String,
///     is_deleted: bool,
/// }
///
/// impl_entity! {
///     Customer as "app::Customer" {
///         id,
///         name,
///         is_deleted => "isDeleted",
///     }
/// }
///
/// let mut customer = Customer::default();
/// customer.set_field("isDeleted", FieldValue::Bool(true)).unwrap();
/// assert!(customer.is_deleted);
/// assert_eq!(customer.id(), None);
/// ```
#[macro_export]
macro_rules! impl_entity {
    ($ty:ty as $name:literal { $($field:ident $(=> $column:literal)?),* $(,)? }) => {
        impl $crate::Entity for $ty {
            fn entity_name() -> &'static str {
                $name
            }

            fn get_field(&self, name: &str) -> $crate::Result<$crate::FieldValue> {
                $(
                    if name == $crate::__quarry_column!($field $(, $column)?) {
                        return Ok($crate::ToFieldValue::to_field_value(&self.$field));
                    }
                )*
                Err($crate::QuarryError::Configuration(format!(
                    "entity {} has no field `{}`",
                    $name, name
                )))
            }

            fn set_field(&mut self, name: &str, value: $crate::FieldValue) -> $crate::Result<()> {
                $(
                    if name == $crate::__quarry_column!($field $(, $column)?) {
                        self.$field = $crate::FromFieldValue::from_field_value(value)?;
                        return Ok(());
                    }
                )*
                Err($crate::QuarryError::Configuration(format!(
                    "entity {} has no field `{}`",
                    $name, name
                )))
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __quarry_column {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident, $column:literal) => {
        $column
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuarryError;
    use chrono::NaiveDate;

    #[derive(Debug, Default, PartialEq)]
    struct Order {
        id: i64,
        customer_id: Option<i64>,
        tags: Vec<String>,
        due: Option<NaiveDate>,
    }

    crate::impl_entity! {
        Order as "app::Order" {
            id,
            customer_id => "customerId",
            tags,
            due,
        }
    }

    #[test]
    fn test_get_and_set_by_column_name() {
        let mut order = Order::default();
        order.set_field("customerId", FieldValue::Int(9)).unwrap();
        order
            .set_field("tags", FieldValue::Set(vec!["a".into()]))
            .unwrap();
        order.set_field("due", FieldValue::Null).unwrap();
        assert_eq!(order.customer_id, Some(9));
        assert_eq!(order.get_field("tags").unwrap(), FieldValue::Set(vec!["a".into()]));
        assert_eq!(order.get_field("due").unwrap(), FieldValue::Null);
    }

    #[test]
    fn test_unknown_field_is_configuration_error() {
        let mut order = Order::default();
        assert!(matches!(
            order.get_field("customer_id"),
            Err(QuarryError::Configuration(_))
        ));
        assert!(order.set_field("nope", FieldValue::Null).is_err());
    }

    #[test]
    fn test_type_mismatch_is_conversion_error() {
        let mut order = Order::default();
        let err = order
            .set_field("id", FieldValue::Text("x".into()))
            .unwrap_err();
        assert!(matches!(err, QuarryError::Conversion(_)));
    }

    #[test]
    fn test_id_and_name() {
        let order = Order {
            id: 3,
            ..Order::default()
        };
        assert_eq!(order.id(), Some(3));
        assert_eq!(Order::entity_name(), "app::Order");
    }
}
