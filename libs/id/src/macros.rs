//! Macros for defining typed ID types.

/// Macro to define a typed, opaque string ID.
///
/// This generates a newtype wrapper around `String` with:
/// - `new()` to wrap a value assigned elsewhere
/// - `as_str()` to borrow the raw value
/// - `Display`, `From<&str>` and `From<String>` implementations
/// - `Serialize` and `Deserialize` as a `{"value": "..."}` object
/// - `Ord`, `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_id!(OfferId);
///
/// let offer_id = OfferId::new("4b2c-O12");
/// assert_eq!(offer_id.as_str(), "4b2c-O12");
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        /// A typed, manager-assigned identifier.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw ID value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the raw ID value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the ID, returning the raw value.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Returns true if the raw value is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                use serde::ser::SerializeStruct;

                let mut state = serializer.serialize_struct(stringify!($name), 1)?;
                state.serialize_field("value", &self.0)?;
                state.end()
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                #[derive(serde::Deserialize)]
                struct Wire {
                    value: String,
                }

                let wire = Wire::deserialize(deserializer)?;
                Ok(Self(wire.value))
            }
        }
    };
}
