//! scriptlet-value — host data → dynamic value trees.
//!
//! Scriptlets never see host types directly. Everything handed to a script
//! (placement requests, candidate members, resource snapshots) is first
//! converted into a [`DynamicValue`]: a small, self-describing tree of
//! scalars, lists and string-keyed dictionaries.
//!
//! Conversion is driven by `serde::Serialize`. The serde data model is the
//! closed set of shapes the converter understands, and a type's `Serialize`
//! impl is how a record describes its exported fields:
//!
//! - `#[serde(rename = "...")]` sets the dictionary key of a field
//! - `#[serde(skip)]` hides a field from scripts
//! - `#[serde(flatten)]` merges an embedded record into its parent
//!
//! ```text
//! host record ──Serialize──▶ Serializer ──▶ DynamicValue ──▶ interpreter
//! ```
//!
//! Map keys are sorted before insertion, so the output never depends on the
//! iteration order of a `HashMap`.

pub mod error;
pub mod ser;
pub mod value;

pub use error::ConvertError;
pub use ser::{Serializer, opaque, to_dynamic};
pub use value::{Dict, DynamicValue};
