use std::fmt::{Debug, Display, LowerExp};

use num_traits::{Float as NumFloat, FromPrimitive};

/// Marker trait for the base floating-point types (`f32`, `f64`).
///
/// Bundles the numeric and utility traits the tape and its evaluators need.
/// Only primitive float types implement this; [`Active`](crate::Active) does not.
pub trait Float:
    NumFloat + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + LowerExp + 'static
{
}

impl Float for f32 {}
impl Float for f64 {}
