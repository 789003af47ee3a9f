//! Proptest generators for property-based testing.

use proptest::prelude::*;

/// A script with at least one non-whitespace character.
///
/// Includes multi-byte characters so byte-level handling is exercised.
pub fn script() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9_ (){}=+*/.,:;'\"\\[\\]\n\t-]{1,200}",
        "\\PC{1,64}",
    ]
    .prop_filter("script must not be blank", |s| !s.trim().is_empty())
}

/// A script consisting only of whitespace, possibly empty.
pub fn blank_script() -> impl Strategy<Value = String> {
    "[ \t\r\n]{0,16}".prop_map(String::from)
}

/// A non-empty cipher key drawn from the identifier alphabet.
pub fn key() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_]{1,64}".prop_map(String::from)
}

/// Parameters for building a chain deterministically.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub script: String,
    pub seed: u64,
}

impl Arbitrary for ChainParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (script(), any::<u64>())
            .prop_map(|(script, seed)| ChainParams { script, seed })
            .boxed()
    }
}
