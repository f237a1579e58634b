//! Element types storable in device arrays

use super::DeviceArray;
use std::fmt;

/// Cell/face index type used by interface addressing tables
pub type Label = u32;

/// Floating-point field type used by solver fields
pub type Scalar = f64;

/// Plain-old-data types that can live in device memory
///
/// Every element type owns a process-wide empty array returned by
/// [`DeviceArray::null`].
pub trait DeviceElement:
    Copy + Default + PartialEq + Send + Sync + fmt::Debug + fmt::Display + 'static
{
    /// Type name written in keyword entries (`List<scalar>`)
    const TYPE_NAME: &'static str;

    /// Parse one value token of the textual list format
    fn parse_token(token: &str) -> Option<Self>;

    /// Shared immutable empty array for this element type
    fn null_array() -> &'static DeviceArray<Self>;
}

macro_rules! impl_device_element {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl DeviceElement for $ty {
                const TYPE_NAME: &'static str = $name;

                fn parse_token(token: &str) -> Option<Self> {
                    token.parse().ok()
                }

                fn null_array() -> &'static DeviceArray<Self> {
                    static NULL: DeviceArray<$ty> = DeviceArray::new();
                    &NULL
                }
            }
        )*
    };
}

impl_device_element! {
    bool => "bool",
    i8 => "char",
    u8 => "uint8",
    i32 => "int32",
    u32 => "label",
    i64 => "int64",
    u64 => "uint64",
    f32 => "floatScalar",
    f64 => "scalar",
}
