//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity: two sizes of `3 ha`, or two prices of
/// `1250 IDR`, are interchangeable. They are immutable; a change is expressed by an
/// event carrying the new value.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct AreaSize { value: f64, unit: AreaUnit }
///
/// impl ValueObject for AreaSize {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
