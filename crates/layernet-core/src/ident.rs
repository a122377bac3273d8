macro_rules! identifier {
    ($name: ident, $inner: ty) => {
        #[allow(missing_docs)]
        #[derive(
            Debug,
            Default,
            Copy,
            Clone,
            PartialOrd,
            Ord,
            PartialEq,
            Eq,
            Hash,
            derive_more::Display,
            derive_more::FromStr,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name($inner);

        impl $name {
            /// Creates a new ID.
            pub const fn new(val: $inner) -> Self {
                Self(val)
            }

            /// Returns the inner representation of the ID.
            pub const fn inner(self) -> $inner {
                self.0
            }
        }
    };
}

/// Generates the `From<$id> for ElementId` conversion and the matching accessor pair on
/// `ElementId`.
macro_rules! element_kind {
    ($variant: ident, $id: ty, $as_fn: ident, $is_fn: ident) => {
        impl From<$id> for ElementId {
            fn from(id: $id) -> Self {
                ElementId::$variant(id)
            }
        }

        impl ElementId {
            #[allow(missing_docs)]
            pub fn $as_fn(self) -> Option<$id> {
                match self {
                    ElementId::$variant(id) => Some(id),
                    _ => None,
                }
            }

            #[allow(missing_docs)]
            pub fn $is_fn(self) -> bool {
                matches!(self, ElementId::$variant(_))
            }
        }
    };
}
